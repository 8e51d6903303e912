//! The runtime hosting the worker.
//!
//! The hosting runtime owns the operations a worker can only request:
//! skipping the waiting phase, claiming open pages, and posting to them.

use async_trait::async_trait;
use ft_common::WorkerMessage;
use tokio::sync::broadcast;

/// Operations the worker asks of its hosting runtime.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Let the waiting worker activate without waiting for pages to close.
    async fn skip_waiting(&self);

    /// Make this worker the controller of every open page in scope.
    async fn claim_clients(&self);

    /// Post a message to every open page in scope. Returns how many pages
    /// received it.
    async fn broadcast(&self, message: &WorkerMessage) -> usize;
}

/// In-process host delivering broadcasts over a `tokio` broadcast channel.
///
/// Each page subscribes with [`ChannelWorkerHost::subscribe`]; the
/// subscriptions count as open pages.
#[derive(Debug, Clone)]
pub struct ChannelWorkerHost {
    sender: broadcast::Sender<WorkerMessage>,
    controller_changes: broadcast::Sender<()>,
}

impl Default for ChannelWorkerHost {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ChannelWorkerHost {
    /// Create a host whose channel buffers `capacity` messages per page.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (controller_changes, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            controller_changes,
        }
    }

    /// Open a page: receive every later broadcast.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.sender.subscribe()
    }

    /// Be told each time a worker claims the open pages.
    #[must_use]
    pub fn subscribe_controller_changes(&self) -> broadcast::Receiver<()> {
        self.controller_changes.subscribe()
    }

    /// Number of open pages.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl WorkerHost for ChannelWorkerHost {
    async fn skip_waiting(&self) {
        tracing::debug!("Skip waiting requested");
    }

    async fn claim_clients(&self) {
        // Nobody listening is fine; the next page load sees the new controller.
        let _ = self.controller_changes.send(());
    }

    async fn broadcast(&self, message: &WorkerMessage) -> usize {
        self.sender.send(message.clone()).unwrap_or(0)
    }
}
