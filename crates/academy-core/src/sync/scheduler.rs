//! Debounced push scheduler
//!
//! At most one push timer is pending at a time. Scheduling replaces the
//! pending timer outright, so a burst of local changes inside one debounce
//! window produces a single push. The pushed snapshot is read when the timer
//! fires, not when it was scheduled.
//!
//! A timer that has fired owns its push: later cancellations never abort a
//! network call in flight. Pushes are serialized, so they reach the remote
//! in firing order.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::remote::RemoteStore;
use crate::snapshot::Snapshot;

const WAITING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// A scheduled push that has not necessarily fired yet
#[derive(Debug)]
struct PendingPush {
    task: JoinHandle<()>,
    state: Arc<AtomicU8>,
}

impl PendingPush {
    /// Cancel if still waiting; returns false if it already fired
    fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(WAITING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.task.abort();
        }
        cancelled
    }

    fn is_waiting(&self) -> bool {
        self.state.load(Ordering::Acquire) == WAITING
    }
}

/// Schedules debounced pushes of the current state
pub struct PushScheduler {
    remote: Arc<dyn RemoteStore>,
    state: watch::Receiver<Snapshot>,
    delay: Duration,
    pending: Option<PendingPush>,
    push_lock: Arc<Mutex<()>>,
}

impl PushScheduler {
    /// Create a scheduler pushing `state` to `remote` after `delay`
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        state: watch::Receiver<Snapshot>,
        delay: Duration,
    ) -> Self {
        Self {
            remote,
            state,
            delay,
            pending: None,
            push_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a push timer is waiting to fire
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(PendingPush::is_waiting)
    }

    /// Cancel any waiting timer and start a new one
    pub fn schedule(&mut self) {
        if self.cancel() {
            debug!("Coalesced pending push");
        }

        let state = Arc::new(AtomicU8::new(WAITING));
        let task = tokio::spawn(fire_after(
            self.delay,
            Arc::clone(&state),
            Arc::clone(&self.remote),
            self.state.clone(),
            Arc::clone(&self.push_lock),
        ));
        self.pending = Some(PendingPush { task, state });
    }

    /// Cancel the waiting timer, if any; returns whether one was cancelled
    pub fn cancel(&mut self) -> bool {
        self.pending
            .take()
            .is_some_and(|pending| pending.cancel())
    }

    /// Push now if a timer is waiting, then wait for pushes in flight
    pub async fn flush(&mut self) {
        if self.cancel() {
            debug!("Flushing pending push");
            push_current(self.remote.as_ref(), &self.state, &self.push_lock).await;
        } else {
            // Wait for a fired push to finish
            let _guard = self.push_lock.lock().await;
        }
    }
}

impl Drop for PushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn fire_after(
    delay: Duration,
    timer_state: Arc<AtomicU8>,
    remote: Arc<dyn RemoteStore>,
    state: watch::Receiver<Snapshot>,
    push_lock: Arc<Mutex<()>>,
) {
    tokio::time::sleep(delay).await;

    if timer_state
        .compare_exchange(WAITING, FIRED, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    push_current(remote.as_ref(), &state, &push_lock).await;
}

/// Push the snapshot current at this moment; failures are logged only
async fn push_current(
    remote: &dyn RemoteStore,
    state: &watch::Receiver<Snapshot>,
    push_lock: &Mutex<()>,
) {
    let _guard = push_lock.lock().await;
    let snapshot = state.borrow().clone();

    match remote.push(&snapshot).await {
        Ok(()) => debug!("Pushed state to remote"),
        Err(e) => warn!(error = %e, "Push failed; will retry with the next local change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryRemote;
    use serde_json::json;

    fn snapshot_with(name: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .upsert_record("students", json!({"id": "s1", "name": name}))
            .unwrap();
        snapshot
    }

    fn scheduler(remote: &MemoryRemote) -> (PushScheduler, watch::Sender<Snapshot>) {
        let (tx, rx) = watch::channel(Snapshot::default());
        let scheduler = PushScheduler::new(
            Arc::new(remote.clone()),
            rx,
            Duration::from_millis(1000),
        );
        (scheduler, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_push_of_final_state() {
        let remote = MemoryRemote::new();
        let (mut scheduler, state) = scheduler(&remote);

        for name in ["a", "b", "c"] {
            state.send_replace(snapshot_with(name));
            scheduler.schedule();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(scheduler.has_pending());

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].snapshot, snapshot_with("c"));
        assert!(!scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_state_at_fire_time() {
        let remote = MemoryRemote::new();
        let (mut scheduler, state) = scheduler(&remote);

        state.send_replace(snapshot_with("scheduled"));
        scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(500)).await;
        // Changed without rescheduling
        state.send_replace(snapshot_with("fired"));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(remote.pushes()[0].snapshot, snapshot_with("fired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_fires_after_delay() {
        let remote = MemoryRemote::new();
        let (mut scheduler, _state) = scheduler(&remote);

        let start = tokio::time::Instant::now();
        scheduler.schedule();

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(remote.push_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(remote.push_count(), 1);
        assert!(remote.pushes()[0].at - start >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_push() {
        let remote = MemoryRemote::new();
        let (mut scheduler, _state) = scheduler(&remote);

        scheduler.schedule();
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remote.push_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_failure_is_not_retried() {
        let remote = MemoryRemote::new();
        remote.fail_next_push("remote down");
        let (mut scheduler, _state) = scheduler(&remote);

        scheduler.schedule();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(remote.push_count(), 0);

        // The next change goes through
        scheduler.schedule();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(remote.push_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pushes_immediately() {
        let remote = MemoryRemote::new();
        let (mut scheduler, state) = scheduler(&remote);

        state.send_replace(snapshot_with("last edit"));
        scheduler.schedule();
        let start = tokio::time::Instant::now();
        scheduler.flush().await;

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].snapshot, snapshot_with("last edit"));
        assert!(pushes[0].at - start < Duration::from_millis(1000));

        // The cancelled timer does not push again
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(remote.push_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_without_pending_is_noop() {
        let remote = MemoryRemote::new();
        let (mut scheduler, _state) = scheduler(&remote);

        scheduler.flush().await;
        assert_eq!(remote.push_count(), 0);
    }
}
