use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use ft_cli::report::{render_stamp, render_status};
use ft_cli::stamp::run_stamp as stamp_targets;
use ft_common::WorkerMessage;
use ft_updater::{
    FileStore, HttpDescriptorSource, PageHost, PollConfig, UpdateCoordinator, UpdateStatus,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cli::{CheckArgs, StampArgs};

/// Stands in for the page: a reload just reports the switch.
struct TerminalPage;

impl PageHost for TerminalPage {
    fn reload(&self) {
        info!("Reload requested");
        println!("Switched to the new version");
    }
}

pub fn run_stamp(args: &StampArgs) -> Result<()> {
    let report = stamp_targets(&args.version_file, &args.targets, Utc::now())?;
    println!("{}", render_stamp(&report));
    Ok(())
}

pub fn run_check(args: &CheckArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(check(args))
}

async fn check(args: &CheckArgs) -> Result<()> {
    let config = PollConfig {
        interval_ms: args.interval_ms,
        ..PollConfig::default()
    };
    if let Some(parent) = args.store.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }

    let source = HttpDescriptorSource::new(args.base_url.as_str(), config.version_path.as_str())
        .with_context(|| format!("invalid base URL {}", args.base_url))?;
    let mut coordinator = UpdateCoordinator::new(
        config,
        Arc::new(source),
        Arc::new(FileStore::new(args.store.clone())),
        Arc::new(TerminalPage),
    );

    if args.watch {
        return watch(coordinator, &args.base_url).await;
    }

    let status = coordinator.start().await.clone();
    println!("{}", render_status(&args.base_url, &status));
    if status.last_checked.is_none() {
        bail!("could not fetch the version descriptor from {}", args.base_url);
    }
    if args.accept && status.update_available {
        let path = coordinator.reload_now().await;
        debug!("Accepted update via {:?}", path);
    }
    Ok(())
}

async fn watch(coordinator: UpdateCoordinator, origin: &str) -> Result<()> {
    // No worker in this process, so nothing ever broadcasts.
    let (_messages_tx, messages) = broadcast::channel::<WorkerMessage>(1);
    let handle = coordinator.spawn(messages);
    let mut updates = handle.watch_status();
    let mut shown: Option<UpdateStatus> = None;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    debug!("Coordinator stopped publishing");
                    break;
                }
                let status = updates.borrow_and_update().clone();
                let differs = shown.as_ref().is_none_or(|prev| {
                    prev.remote != status.remote
                        || prev.current != status.current
                        || prev.update_available != status.update_available
                });
                if differs {
                    println!("{}\n", render_status(origin, &status));
                    shown = Some(status);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for interrupt")?;
                break;
            }
        }
    }

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .context("coordinator did not stop")?;
    Ok(())
}
