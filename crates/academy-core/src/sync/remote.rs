//! Remote document store abstraction
//!
//! The engine talks to the remote replica only through [`RemoteStore`], a thin
//! transport with three operations on the single shared document:
//! - `pull()` fetches it by its fixed key
//! - `push()` upserts (create-or-replace) it with a full snapshot
//! - `subscribe()` delivers every inbound update event to a channel
//!
//! No retry or backoff lives here; failures are reported to the caller.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::SyncResult;
use super::message::ChangeNotification;
use crate::snapshot::Snapshot;

/// Sender half handed to a subscription
pub type NotificationSink = mpsc::UnboundedSender<ChangeNotification>;

/// Remote replica of the state document
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the shared document; `None` if the remote has none yet
    async fn pull(&self) -> SyncResult<Option<Snapshot>>;

    /// Create or replace the shared document
    async fn push(&self, snapshot: &Snapshot) -> SyncResult<()>;

    /// Start delivering update events for the shared document to `sink`
    ///
    /// Events arrive in the remote service's delivery order. Each one carries
    /// a full snapshot, so duplicates are harmless.
    async fn subscribe(&self, sink: NotificationSink) -> SyncResult<Subscription>;
}

/// Handle to an open change subscription
///
/// Dropping the handle stops delivery.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription driven by a background task
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Subscription whose events are pushed by the remote itself
    pub fn passive() -> Self {
        Self { task: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
