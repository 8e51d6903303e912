//! The page's view of the worker machinery, and the page itself.
//!
//! [`WorkerContainer`] is what a page can see of its scope's workers: whether
//! one is waiting, whether one controls the page, posting a message to either,
//! and a signal when control changes hands. [`ChannelContainer`] implements
//! it on top of in-process [`WorkerController`]s sharing one
//! [`ChannelWorkerHost`].

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ft_common::{ClientMessage, VersionDescriptor};
use ft_worker::{ChannelWorkerHost, FetchOutcome, Network, Request, WorkerController};
use reqwest::Url;
use tokio::sync::broadcast;

use crate::error::{Result, UpdateError};
use crate::source::{DescriptorSource, descriptor_url, parse_descriptor};

/// Which worker a page message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffTarget {
    /// The installed worker waiting to activate.
    Waiting,
    /// The worker currently controlling the page.
    Controller,
}

/// A page's handle on its scope's workers.
#[async_trait]
pub trait WorkerContainer: Send + Sync {
    /// Whether an installed worker is waiting to activate.
    fn has_waiting(&self) -> bool;

    /// Whether a worker controls this page.
    fn has_controller(&self) -> bool;

    /// Post a message. Delivery is fire-and-forget.
    async fn post_message(&self, target: HandoffTarget, message: ClientMessage);

    /// Be told the next time a worker takes control of this page.
    fn controller_changes(&self) -> broadcast::Receiver<()>;
}

/// The page being coordinated.
pub trait PageHost: Send + Sync {
    /// Reload the page.
    fn reload(&self);
}

/// In-process container over registered worker controllers.
pub struct ChannelContainer {
    host: Arc<ChannelWorkerHost>,
    workers: Mutex<Vec<Arc<WorkerController>>>,
}

impl std::fmt::Debug for ChannelContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelContainer")
            .field("has_waiting", &self.has_waiting())
            .field("has_controller", &self.has_controller())
            .finish_non_exhaustive()
    }
}

impl ChannelContainer {
    /// Container for the scope served by `host`.
    #[must_use]
    pub fn new(host: Arc<ChannelWorkerHost>) -> Self {
        Self {
            host,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Register a worker for this scope, newest last.
    pub fn register(&self, worker: Arc<WorkerController>) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        workers.push(worker);
    }

    /// The newest worker still waiting.
    #[must_use]
    pub fn waiting(&self) -> Option<Arc<WorkerController>> {
        self.newest(|w| w.state().is_waiting())
    }

    /// The newest worker controlling the scope.
    #[must_use]
    pub fn controller(&self) -> Option<Arc<WorkerController>> {
        self.newest(|w| w.state().is_controlling())
    }

    fn newest(&self, pred: impl Fn(&WorkerController) -> bool) -> Option<Arc<WorkerController>> {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        workers.iter().rev().find(|w| pred(w)).cloned()
    }
}

#[async_trait]
impl WorkerContainer for ChannelContainer {
    fn has_waiting(&self) -> bool {
        self.waiting().is_some()
    }

    fn has_controller(&self) -> bool {
        self.controller().is_some()
    }

    async fn post_message(&self, target: HandoffTarget, message: ClientMessage) {
        let worker = match target {
            HandoffTarget::Waiting => self.waiting(),
            HandoffTarget::Controller => self.controller(),
        };
        let Some(worker) = worker else {
            tracing::debug!("No {:?} worker to post to", target);
            return;
        };

        tokio::spawn(async move {
            if let Err(err) = worker.handle_message(message).await {
                tracing::warn!("Worker failed to handle message: {}", err);
            }
        });
    }

    fn controller_changes(&self) -> broadcast::Receiver<()> {
        self.host.subscribe_controller_changes()
    }
}

/// Fetches the descriptor the way a page does: through the controlling
/// worker when there is one, straight from the network otherwise.
pub struct ControlledDescriptorSource {
    container: Arc<ChannelContainer>,
    network: Arc<dyn Network>,
    base_url: String,
    version_path: String,
    clock: Arc<dyn ft_common::Clock>,
}

impl ControlledDescriptorSource {
    /// Create a source for pages of `container`'s scope at `base_url`.
    pub fn new(
        container: Arc<ChannelContainer>,
        network: Arc<dyn Network>,
        base_url: impl Into<String>,
        version_path: impl Into<String>,
    ) -> Result<Self> {
        let source = Self {
            container,
            network,
            base_url: base_url.into(),
            version_path: version_path.into(),
            clock: Arc::new(ft_common::SystemClock),
        };
        descriptor_url(&source.base_url, &source.version_path, 0)?;
        Ok(source)
    }

    /// Use a different clock for cache-busting tokens.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ft_common::Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn request(&self) -> Result<Request> {
        let url: Url = descriptor_url(&self.base_url, &self.version_path, self.clock.now_millis())?;
        Ok(Request::get(url).no_store())
    }
}

#[async_trait]
impl DescriptorSource for ControlledDescriptorSource {
    async fn fetch_descriptor(&self) -> Result<VersionDescriptor> {
        let request = self.request()?;

        let response = match self.container.controller() {
            Some(worker) => match worker.handle_fetch(&request).await? {
                FetchOutcome::Respond(response) => response,
                FetchOutcome::Passthrough => self.network.fetch(&request).await?,
            },
            None => self.network.fetch(&request).await?,
        };

        parse_descriptor(response.status, &response.body).map_err(|err| match err {
            UpdateError::JsonParse(reason) => {
                UpdateError::JsonParse(format!("{reason} (from {})", request.url))
            }
            other => other,
        })
    }
}
