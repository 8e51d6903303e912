//! The page-side version poll and reload coordinator.
//!
//! One [`UpdateCoordinator`] exists per page. Timer ticks, worker broadcasts
//! and user reload requests all funnel through [`UpdateCoordinator::handle`].
//! [`UpdateCoordinator::spawn`] runs it as a task and hands back a
//! [`CoordinatorHandle`]; dropping the handle stops polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ft_common::{ClientMessage, Clock, SystemClock, VersionDescriptor, WorkerMessage};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PollConfig;
use crate::container::{HandoffTarget, PageHost, WorkerContainer};
use crate::error::{Result, UpdateError};
use crate::source::DescriptorSource;
use crate::store::KeyValueStore;
use crate::stored::VersionStore;

/// What the page knows about versions right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// The version this page believes it runs.
    pub current: Option<VersionDescriptor>,
    /// The last descriptor fetched from the server.
    pub remote: Option<VersionDescriptor>,
    /// Whether `remote` is strictly newer than `current`.
    pub update_available: bool,
    /// When the last successful fetch happened.
    pub last_checked: Option<DateTime<Utc>>,
}

/// How a reload was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPath {
    /// A waiting worker was released; `controller_changed` is false when the
    /// handoff timed out.
    SkipWaiting {
        /// Whether the new worker took control before the timeout.
        controller_changed: bool,
    },
    /// Only an active controller existed; reloaded after the grace delay.
    Controller,
    /// No worker machinery; reloaded at once.
    Immediate,
    /// A worker broadcast `RELOAD_REQUIRED`.
    Broadcast,
}

/// Everything that can drive the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Poll timer fired.
    Tick,
    /// A worker broadcast arrived.
    Message(WorkerMessage),
    /// The user asked to reload into the new version.
    ReloadRequested,
}

/// Owned coordinator state for one page.
pub struct UpdateCoordinator {
    config: PollConfig,
    source: Arc<dyn DescriptorSource>,
    versions: VersionStore,
    container: Option<Arc<dyn WorkerContainer>>,
    page: Arc<dyn PageHost>,
    clock: Arc<dyn Clock>,
    status: UpdateStatus,
    started: bool,
    reloading: bool,
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("reloading", &self.reloading)
            .finish_non_exhaustive()
    }
}

impl UpdateCoordinator {
    /// Create a coordinator for a page without worker machinery.
    #[must_use]
    pub fn new(
        config: PollConfig,
        source: Arc<dyn DescriptorSource>,
        store: Arc<dyn KeyValueStore>,
        page: Arc<dyn PageHost>,
    ) -> Self {
        let versions = VersionStore::new(store, &config);
        Self {
            config,
            source,
            versions,
            container: None,
            page,
            clock: Arc::new(SystemClock),
            status: UpdateStatus::default(),
            started: false,
            reloading: false,
        }
    }

    /// Attach the page's worker container.
    #[must_use]
    pub fn with_container(mut self, container: Arc<dyn WorkerContainer>) -> Self {
        self.container = Some(container);
        self
    }

    /// Use a different clock for staleness checks and timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.versions = self.versions.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> &UpdateStatus {
        &self.status
    }

    /// Whether a reload has been initiated.
    #[must_use]
    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Read the stored version and run the first check. Only the first call
    /// does anything.
    pub async fn start(&mut self) -> &UpdateStatus {
        if self.started {
            tracing::debug!("Update polling already started");
            return &self.status;
        }
        self.started = true;

        self.status.current = self.versions.read();
        match &self.status.current {
            Some(current) => {
                tracing::info!("Checking for updates (current version: {})", current.version);
            }
            None => tracing::info!("Checking for updates (no stored version)"),
        }

        self.evaluate().await;
        &self.status
    }

    /// Fetch the descriptor and recompute availability. Returns whether an
    /// update is available.
    ///
    /// A failed fetch is no signal: the previous answer stands.
    pub async fn evaluate(&mut self) -> bool {
        let remote = match self.source.fetch_descriptor().await {
            Ok(remote) => remote,
            Err(err) => {
                tracing::debug!("Version check failed: {}", err);
                return self.status.update_available;
            }
        };
        self.status.last_checked = Some(self.clock.now());

        // Another tab may have written since the last tick.
        let stored = self.versions.read();
        let available = match &stored {
            None => {
                tracing::info!("Adopting {} as the running version", remote);
                self.versions.write(&remote);
                self.status.current = Some(remote.clone());
                false
            }
            Some(stored) => {
                self.status.current = Some(stored.clone());
                remote.is_newer_than(stored)
            }
        };

        if available
            && !self.status.update_available
            && let Some(current) = &stored
        {
            tracing::info!("Update available: {} -> {}", current.version, remote.version);
        }
        self.status.update_available = available;
        self.status.remote = Some(remote);
        available
    }

    /// Persist the latest remote version, release the new worker and reload.
    ///
    /// Returns `None` if a reload is already under way.
    pub async fn reload_now(&mut self) -> Option<ReloadPath> {
        if self.reloading {
            tracing::debug!("Reload already in progress");
            return None;
        }
        self.reloading = true;

        if let Some(remote) = self.status.remote.clone() {
            self.versions.write(&remote);
            self.status.current = Some(remote);
            self.status.update_available = false;
        }

        let path = match self.container.clone() {
            Some(container) if container.has_waiting() => {
                let mut changes = container.controller_changes();
                container
                    .post_message(HandoffTarget::Waiting, ClientMessage::SkipWaiting)
                    .await;

                let timeout = self.config.handoff_timeout();
                let controller_changed = matches!(
                    tokio::time::timeout(timeout, changes.recv()).await,
                    Ok(Ok(()) | Err(RecvError::Lagged(_)))
                );
                if !controller_changed {
                    tracing::warn!(
                        "New worker did not take control within {} ms, reloading anyway",
                        timeout.as_millis()
                    );
                }
                ReloadPath::SkipWaiting { controller_changed }
            }
            Some(container) if container.has_controller() => {
                container
                    .post_message(HandoffTarget::Controller, ClientMessage::SkipWaiting)
                    .await;
                tokio::time::sleep(self.config.controller_grace()).await;
                ReloadPath::Controller
            }
            _ => ReloadPath::Immediate,
        };

        tracing::info!("Reloading page ({:?})", path);
        self.page.reload();
        Some(path)
    }

    /// React to a worker broadcast.
    pub fn handle_message(&mut self, message: WorkerMessage) -> Option<ReloadPath> {
        match message {
            WorkerMessage::ReloadRequired { version } => {
                let target = version.or_else(|| self.status.remote.clone());
                if let Some(target) = target {
                    self.versions.write(&target);
                    self.status.current = Some(target);
                    self.status.update_available = false;
                }

                if self.reloading {
                    tracing::debug!("RELOAD_REQUIRED received while already reloading");
                    return None;
                }
                self.reloading = true;
                tracing::info!("Reloading page (worker requested)");
                self.page.reload();
                Some(ReloadPath::Broadcast)
            }
        }
    }

    /// Single entry point for every event.
    pub async fn handle(&mut self, event: CoordinatorEvent) -> Option<ReloadPath> {
        match event {
            CoordinatorEvent::Tick => {
                if !self.reloading {
                    self.evaluate().await;
                }
                None
            }
            CoordinatorEvent::Message(message) => self.handle_message(message),
            CoordinatorEvent::ReloadRequested => self.reload_now().await,
        }
    }

    /// Run the coordinator as a task: start, then poll every interval while
    /// listening to `messages` and to commands from the returned handle.
    ///
    /// Ticks never overlap: each event is handled to completion before the
    /// next is taken, and ticks missed meanwhile are skipped.
    #[must_use]
    pub fn spawn(mut self, mut messages: broadcast::Receiver<WorkerMessage>) -> CoordinatorHandle {
        let (commands_tx, mut commands) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(UpdateStatus::default());

        let task = tokio::spawn(async move {
            self.start().await;
            status_tx.send_replace(self.status.clone());

            let period = self.config.interval();
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut listening = true;

            loop {
                let event = tokio::select! {
                    _ = ticker.tick() => CoordinatorEvent::Tick,
                    received = messages.recv(), if listening => match received {
                        Ok(message) => CoordinatorEvent::Message(message),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Missed {} worker messages", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            tracing::debug!("Worker message channel closed");
                            listening = false;
                            continue;
                        }
                    },
                    command = commands.recv() => match command {
                        Some(Command::ReloadNow) => CoordinatorEvent::ReloadRequested,
                        Some(Command::Shutdown) | None => break,
                    },
                };

                self.handle(event).await;
                status_tx.send_replace(self.status.clone());
            }

            tracing::debug!("Update coordinator stopped");
        });

        CoordinatorHandle {
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }
}

#[derive(Debug)]
enum Command {
    ReloadNow,
    Shutdown,
}

/// Handle on a spawned coordinator.
#[derive(Debug)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<UpdateStatus>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Ask the coordinator to reload into the new version.
    pub async fn reload_now(&self) -> Result<()> {
        self.commands
            .send(Command::ReloadNow)
            .await
            .map_err(|_| UpdateError::Stopped)
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> UpdateStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<UpdateStatus> {
        self.status.clone()
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(self) {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(err) = self.task.await {
            tracing::warn!("Update coordinator task failed: {}", err);
        }
    }
}
