//! Offline worker for the Financial Tracker PWA.
//!
//! The worker sits between open pages and the network. It keeps two cache
//! generations, routes every intercepted request through one of four
//! strategies, and hands control to a newly deployed version only when a page
//! asks for it.
//!
//! # Overview
//!
//! - **Install** precaches the shell manifest into the static generation,
//!   best effort. The new worker then waits.
//! - **Activate** deletes stale caches from earlier deploys, recreates the
//!   runtime generation empty and claims every open page.
//! - **Fetch** routing, first match wins:
//!   1. version descriptor: network first with a cache-busting query, cached
//!      copy only when offline
//!   2. navigations: cached shell document first
//!   3. shell assets and any other same-origin `GET`: cache first
//!   4. anything else passes through
//! - **Messages**: `SKIP_WAITING` activates a waiting worker, fetches the
//!   freshest descriptor and broadcasts `RELOAD_REQUIRED` to every page.
//!
//! On a local development host (`localhost`, `127.0.0.1`, `::1`,
//! `*.localhost`) nothing is cached and every same-origin request goes
//! straight to the network.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ft_worker::{
//!     ChannelWorkerHost, HttpNetwork, MemoryCacheStorage, WorkerConfig, WorkerController,
//! };
//!
//! async fn boot() -> ft_worker::Result<()> {
//!     let host = Arc::new(ChannelWorkerHost::default());
//!     let worker = WorkerController::new(
//!         WorkerConfig::for_origin("https://budget.example"),
//!         Arc::new(MemoryCacheStorage::new()),
//!         Arc::new(HttpNetwork::new()?),
//!         host.clone(),
//!     )?;
//!
//!     let report = worker.install().await?;
//!     println!("precached {} entries", report.precached.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod router;

pub use cache::{
    CacheGeneration, CacheNames, CacheStorage, DEFAULT_QUOTA_BYTES, MemoryCacheStorage,
};
pub use config::{BuildStamp, WorkerConfig, is_local_host};
pub use controller::{ActivationReport, FetchOutcome, InstallReport, WorkerController};
pub use error::{CacheError, NetworkError, Result, WorkerError};
pub use host::{ChannelWorkerHost, WorkerHost};
pub use http::{CacheMode, Request, RequestMode, Response};
pub use lifecycle::{WorkerState, is_valid_transition};
pub use network::{HttpNetwork, Network};
pub use router::{Route, RouteDecision, RouteMatcher, Router, Strategy};

/// Version of this worker crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
