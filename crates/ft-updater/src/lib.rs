//! Version polling and reload coordination for the Financial Tracker PWA.
//!
//! Each open page runs one [`UpdateCoordinator`]. It polls the deployed
//! version descriptor, compares it with the version the page believes it is
//! running, and when the user asks, hands control to the waiting worker and
//! reloads.
//!
//! # Overview
//!
//! - The first successful fetch on a fresh profile is adopted silently; no
//!   update is reported.
//! - An update is available when the fetched version is strictly greater
//!   than the stored one, compared as dotted numbers.
//! - Reloading persists the new version first, then:
//!   - a waiting worker gets `SKIP_WAITING` and the page reloads once it
//!     takes control (or after 1.5 s)
//!   - an active controller gets `SKIP_WAITING` and the page reloads after
//!     500 ms
//!   - without any worker the page reloads at once
//! - A `RELOAD_REQUIRED` broadcast from a worker reloads the page at any time.
//!
//! Stored versions that are unreadable, empty or older than 90 days are
//! discarded with a warning. Storage and network failures are never fatal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ft_updater::{HttpDescriptorSource, MemoryStore, PageHost, PollConfig, UpdateCoordinator};
//!
//! struct Page;
//!
//! impl PageHost for Page {
//!     fn reload(&self) {
//!         println!("reloading");
//!     }
//! }
//!
//! async fn check() -> ft_updater::Result<()> {
//!     let config = PollConfig::default();
//!     let source = HttpDescriptorSource::new("https://budget.example", &config.version_path)?;
//!     let mut coordinator = UpdateCoordinator::new(
//!         config,
//!         Arc::new(source),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(Page),
//!     );
//!
//!     let status = coordinator.start().await;
//!     println!("update available: {}", status.update_available);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod container;
pub mod coordinator;
pub mod error;
pub mod source;
pub mod store;
pub mod stored;

pub use config::PollConfig;
pub use container::{
    ChannelContainer, ControlledDescriptorSource, HandoffTarget, PageHost, WorkerContainer,
};
pub use coordinator::{
    CoordinatorEvent, CoordinatorHandle, ReloadPath, UpdateCoordinator, UpdateStatus,
};
pub use error::{Result, StoreError, UpdateError};
pub use source::{DescriptorSource, HttpDescriptorSource, descriptor_url, parse_descriptor};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use stored::{DiscardReason, StoredVersion, VersionStore};
