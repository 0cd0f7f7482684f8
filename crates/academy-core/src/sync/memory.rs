//! In-process remote store
//!
//! Holds the shared document in memory as raw JSON, records every push, and
//! lets callers inject failures and change notifications. Pulls decode the
//! stored document the way the HTTP client decodes a fetched row. Clones share
//! the same state, so one clone can be handed to the engine while another
//! inspects it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::error::{SyncError, SyncResult};
use super::message::ChangeNotification;
use super::remote::{NotificationSink, RemoteStore, Subscription};
use crate::config::DEFAULT_DOCUMENT_KEY;
use crate::snapshot::Snapshot;

/// A push received by the memory remote
#[derive(Debug, Clone)]
pub struct PushRecord {
    /// When the push arrived
    pub at: Instant,
    /// The pushed document
    pub snapshot: Snapshot,
}

/// Remote store kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    document: Option<Value>,
    pushes: Vec<PushRecord>,
    pull_count: usize,
    subscribers: Vec<NotificationSink>,
    pull_delay: Option<Duration>,
    echo_pushes: bool,
    fail_next_pull: Option<String>,
    fail_next_push: Option<String>,
    fail_next_subscribe: Option<String>,
}

impl MemoryRemote {
    /// Create an empty remote (no shared document yet)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a remote already holding a document
    pub fn with_document(snapshot: Snapshot) -> Self {
        let remote = Self::new();
        remote.inner().document = Some(snapshot.to_value());
        remote
    }

    /// Create a remote holding an arbitrary JSON document, valid or not
    pub fn with_raw_document(document: Value) -> Self {
        let remote = Self::new();
        remote.inner().document = Some(document);
        remote
    }

    fn inner(&self) -> MutexGuard<'_, MemoryRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current remote document, if it decodes
    pub fn document(&self) -> Option<Snapshot> {
        let raw = self.inner().document.clone()?;
        Snapshot::from_remote_value(raw).ok()
    }

    /// All pushes received so far
    pub fn pushes(&self) -> Vec<PushRecord> {
        self.inner().pushes.clone()
    }

    /// Number of pushes received so far
    pub fn push_count(&self) -> usize {
        self.inner().pushes.len()
    }

    /// Number of pulls served (including failed ones)
    pub fn pull_count(&self) -> usize {
        self.inner().pull_count
    }

    /// Delay every pull by `delay`
    pub fn set_pull_delay(&self, delay: Duration) {
        self.inner().pull_delay = Some(delay);
    }

    /// Deliver each accepted push back to subscribers, as a real service does
    pub fn set_echo_pushes(&self, echo: bool) {
        self.inner().echo_pushes = echo;
    }

    /// Cause the next pull to fail with the given error
    pub fn fail_next_pull(&self, error: &str) {
        self.inner().fail_next_pull = Some(error.to_string());
    }

    /// Cause the next push to fail with the given error
    pub fn fail_next_push(&self, error: &str) {
        self.inner().fail_next_push = Some(error.to_string());
    }

    /// Cause the next subscribe to fail with the given error
    pub fn fail_next_subscribe(&self, error: &str) {
        self.inner().fail_next_subscribe = Some(error.to_string());
    }

    /// Deliver a raw change notification to every subscriber
    ///
    /// Returns the number of subscribers reached.
    pub fn notify(&self, notification: ChangeNotification) -> usize {
        let mut inner = self.inner();
        inner
            .subscribers
            .retain(|sink| sink.send(notification.clone()).is_ok());
        inner.subscribers.len()
    }

    /// Replace the remote document as another client would, and notify
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        self.inner().document = Some(snapshot.to_value());
        self.notify(ChangeNotification {
            id: DEFAULT_DOCUMENT_KEY.to_string(),
            data: snapshot.to_value(),
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn pull(&self) -> SyncResult<Option<Snapshot>> {
        let delay = {
            let mut inner = self.inner();
            inner.pull_count += 1;
            inner.pull_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner();
        if let Some(error) = inner.fail_next_pull.take() {
            return Err(SyncError::Pull(error));
        }
        match inner.document.clone() {
            Some(raw) => Ok(Some(Snapshot::from_remote_value(raw)?)),
            None => Ok(None),
        }
    }

    async fn push(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let echo = {
            let mut inner = self.inner();
            if let Some(error) = inner.fail_next_push.take() {
                return Err(SyncError::Push(error));
            }
            inner.pushes.push(PushRecord {
                at: Instant::now(),
                snapshot: snapshot.clone(),
            });
            inner.document = Some(snapshot.to_value());
            inner.echo_pushes
        };

        if echo {
            self.notify(ChangeNotification {
                id: DEFAULT_DOCUMENT_KEY.to_string(),
                data: snapshot.to_value(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, sink: NotificationSink) -> SyncResult<Subscription> {
        let mut inner = self.inner();
        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(SyncError::Subscribe(error));
        }
        inner.subscribers.push(sink);
        Ok(Subscription::passive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn snapshot_with_student(name: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .upsert_record("students", json!({"id": "s1", "name": name}))
            .unwrap();
        snapshot
    }

    #[tokio::test]
    async fn test_pull_and_push() {
        let remote = MemoryRemote::new();
        assert!(remote.pull().await.unwrap().is_none());

        let snapshot = snapshot_with_student("Ana");
        remote.push(&snapshot).await.unwrap();

        assert_eq!(remote.pull().await.unwrap(), Some(snapshot));
        assert_eq!(remote.push_count(), 1);
        assert_eq!(remote.pull_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_apply_once() {
        let remote = MemoryRemote::with_document(Snapshot::default());

        remote.fail_next_pull("offline");
        assert!(matches!(remote.pull().await, Err(SyncError::Pull(_))));
        assert!(remote.pull().await.is_ok());

        remote.fail_next_push("offline");
        assert!(matches!(
            remote.push(&Snapshot::default()).await,
            Err(SyncError::Push(_))
        ));
        assert_eq!(remote.push_count(), 0);
    }

    #[tokio::test]
    async fn test_mistyped_document_fails_pull() {
        let remote = MemoryRemote::with_raw_document(json!({
            "students": {"s1": "Ana"},
            "classes": []
        }));

        assert!(matches!(
            remote.pull().await,
            Err(SyncError::MalformedDocument(_))
        ));
        assert!(remote.document().is_none());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let remote = MemoryRemote::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = remote.subscribe(tx).await.unwrap();

        let snapshot = snapshot_with_student("Rui");
        assert_eq!(remote.publish(snapshot.clone()), 1);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.id, "global_state");
        assert_eq!(notification.data, snapshot.to_value());
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let remote = MemoryRemote::new();
        let (tx, rx) = mpsc::unbounded_channel();
        remote.subscribe(tx).await.unwrap();
        drop(rx);

        assert_eq!(remote.publish(Snapshot::default()), 0);
    }

    #[tokio::test]
    async fn test_echo_pushes() {
        let remote = MemoryRemote::new();
        remote.set_echo_pushes(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        remote.subscribe(tx).await.unwrap();

        remote.push(&snapshot_with_student("Ana")).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
