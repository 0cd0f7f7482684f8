//! State synchronization engine
//!
//! One task owns the state snapshot. Local mutations, reconciliation results
//! and inbound change notifications reach it through channels and are applied
//! one at a time; each is persisted to the local store before the next one
//! starts. Readers observe the snapshot, connection status and reconciliation
//! phase through watch channels without touching the writer.
//!
//! Startup runs in a separate task (pull, then subscribe) that reports back
//! to the engine, so mutations keep flowing while the network is slow.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::client::RemoteClient;
use super::error::{SyncError, SyncResult};
use super::message::ChangeNotification;
use super::reconcile::{ReconcileStep, Reconciliation, ReconciliationPhase};
use super::remote::{NotificationSink, RemoteStore, Subscription};
use super::scheduler::PushScheduler;
use super::status::ConnectionStatus;
use crate::config::Config;
use crate::credentials::SyncCredentials;
use crate::snapshot::Snapshot;
use crate::storage::LocalStore;

const COMMAND_BUFFER: usize = 64;

type Mutation = Box<dyn FnOnce(&mut Snapshot) + Send>;

/// Commands processed by the engine task
enum EngineCommand {
    /// Apply a local mutation; `done` fires once it is persisted
    Mutate {
        apply: Mutation,
        done: oneshot::Sender<()>,
    },
    /// Outcome of the initial pull
    PullResolved(SyncResult<Option<Snapshot>>),
    /// Outcome of registering the change listener
    SubscribeResolved(SyncResult<Subscription>),
    /// Flush pending pushes and stop
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running engine
///
/// Cheap to clone. The engine stops when [`EngineHandle::shutdown`] is called
/// or every handle has been dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    state: watch::Receiver<Snapshot>,
    status: watch::Receiver<ConnectionStatus>,
    phase: watch::Receiver<ReconciliationPhase>,
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Mutate { .. } => f.write_str("Mutate"),
            EngineCommand::PullResolved(result) => {
                f.debug_tuple("PullResolved").field(&result.is_ok()).finish()
            }
            EngineCommand::SubscribeResolved(result) => f
                .debug_tuple("SubscribeResolved")
                .field(&result.is_ok())
                .finish(),
            EngineCommand::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Start an engine from configuration
///
/// Resolves sync credentials once; without them the engine runs local-only.
pub fn start_engine(config: &Config) -> SyncResult<EngineHandle> {
    let store = LocalStore::new(config);
    let remote: Option<Arc<dyn RemoteStore>> = match SyncCredentials::resolve(config) {
        Some(credentials) => Some(Arc::new(RemoteClient::from_config(config, credentials)?)),
        None => None,
    };
    Ok(spawn_engine(store, remote, config.debounce_window()))
}

/// Spawn the engine task
///
/// The local snapshot is loaded before this returns, and the reconciliation
/// phase has already left START: LOCAL_ONLY without a remote, PULLING (status
/// CONNECTING) with one.
pub fn spawn_engine(
    store: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
    debounce: Duration,
) -> EngineHandle {
    let (state_tx, state_rx) = watch::channel(store.load());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();

    let reconciliation = Reconciliation::new();
    let status = reconciliation.subscribe_status();
    let phase = reconciliation.subscribe_phase();

    let scheduler = match remote {
        None => {
            info!("No sync credentials configured; running local-only");
            reconciliation.advance(ReconcileStep::NoCredentials);
            None
        }
        Some(remote) => {
            reconciliation.advance(ReconcileStep::CredentialsFound);
            tokio::spawn(bootstrap(
                Arc::clone(&remote),
                notification_tx,
                command_tx.clone(),
            ));
            Some(PushScheduler::new(remote, state_rx.clone(), debounce))
        }
    };

    let engine = Engine {
        store,
        state: state_tx,
        reconciliation,
        scheduler,
        subscription: None,
        seed_remote: false,
    };
    tokio::spawn(engine.run(command_rx, notification_rx));

    EngineHandle {
        commands: command_tx,
        state: state_rx,
        status,
        phase,
    }
}

/// Initial pull, then subscription, reported back to the engine in order
async fn bootstrap(
    remote: Arc<dyn RemoteStore>,
    sink: NotificationSink,
    commands: mpsc::Sender<EngineCommand>,
) {
    debug!("Pulling remote document");
    let pulled = remote.pull().await;
    let pulled_ok = pulled.is_ok();
    if commands
        .send(EngineCommand::PullResolved(pulled))
        .await
        .is_err()
        || !pulled_ok
    {
        return;
    }

    debug!("Subscribing to remote changes");
    let subscribed = remote.subscribe(sink).await;
    let _ = commands
        .send(EngineCommand::SubscribeResolved(subscribed))
        .await;
}

struct Engine {
    store: LocalStore,
    state: watch::Sender<Snapshot>,
    reconciliation: Reconciliation,
    scheduler: Option<PushScheduler>,
    subscription: Option<Subscription>,
    seed_remote: bool,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut notifications: mpsc::UnboundedReceiver<ChangeNotification>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(EngineCommand::Mutate { apply, done }) => {
                        self.apply_local(apply);
                        let _ = done.send(());
                    }
                    Some(EngineCommand::PullResolved(result)) => self.on_pull(result),
                    Some(EngineCommand::SubscribeResolved(result)) => self.on_subscribe(result),
                    Some(EngineCommand::Shutdown(done)) => {
                        self.stop().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.stop().await;
                        return;
                    }
                },

                Some(notification) = notifications.recv() => self.apply_remote(notification),
            }
        }
    }

    /// Persist and publish `next`; returns false if nothing changed
    fn commit(&mut self, next: Snapshot) -> bool {
        if *self.state.borrow() == next {
            return false;
        }
        self.store.save(&next);
        self.state.send_replace(next);
        true
    }

    fn apply_local(&mut self, apply: Mutation) {
        let mut next = self.state.borrow().clone();
        apply(&mut next);

        if !self.commit(next) {
            debug!("Mutation left state unchanged");
            return;
        }
        self.schedule_push();
    }

    fn schedule_push(&mut self) {
        if !self.reconciliation.push_permitted() {
            debug!(
                phase = %self.reconciliation.phase(),
                status = %self.reconciliation.status(),
                "Change kept local; push not permitted"
            );
            return;
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.schedule();
        }
    }

    fn apply_remote(&mut self, notification: ChangeNotification) {
        if !self.reconciliation.accepts_notifications() {
            debug!(
                phase = %self.reconciliation.phase(),
                "Ignoring change notification before reconciliation"
            );
            return;
        }

        if notification.data.as_object().is_some_and(|fields| fields.is_empty()) {
            warn!(id = %notification.id, "Dropping empty change notification");
            return;
        }

        match Snapshot::from_remote_value(notification.data) {
            Ok(snapshot) => {
                if self.commit(snapshot) {
                    info!("Applied remote change");
                } else {
                    debug!("Remote change matches local state");
                }
            }
            Err(e) => {
                let error = SyncError::MalformedNotification(e.to_string());
                warn!(id = %notification.id, %error, "Dropping change notification");
            }
        }
    }

    fn on_pull(&mut self, result: SyncResult<Option<Snapshot>>) {
        match result {
            Ok(Some(remote)) => {
                if self.commit(remote) {
                    info!("Local state replaced by remote document");
                } else {
                    info!("Local state already matches remote document");
                }
                self.reconciliation.advance(ReconcileStep::PullSucceeded);
            }
            Ok(None) => {
                info!("Remote has no document yet; seeding it from local state");
                self.seed_remote = true;
                self.reconciliation.advance(ReconcileStep::PullSucceeded);
            }
            Err(e) => {
                warn!(error = %e, "Initial pull failed; continuing offline");
                self.reconciliation.advance(ReconcileStep::PullFailed);
            }
        }
    }

    fn on_subscribe(&mut self, result: SyncResult<Subscription>) {
        match result {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.reconciliation.advance(ReconcileStep::Subscribed);
                if std::mem::take(&mut self.seed_remote) {
                    self.schedule_push();
                }
            }
            Err(e) => {
                warn!(error = %e, "Subscribing to remote changes failed; continuing offline");
                self.reconciliation.advance(ReconcileStep::SubscribeFailed);
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.flush().await;
        }
        self.subscription = None;
        debug!("Sync engine stopped");
    }
}

impl EngineHandle {
    /// Apply a local mutation and return its result
    ///
    /// Resolves once the new state is persisted locally. Never fails because
    /// of the remote; only a stopped engine is an error.
    pub async fn mutate<F, R>(&self, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut Snapshot) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let apply: Mutation = Box::new(move |snapshot| {
            let _ = result_tx.send(f(snapshot));
        });

        self.commands
            .send(EngineCommand::Mutate {
                apply,
                done: done_tx,
            })
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        done_rx.await.map_err(|_| SyncError::EngineStopped)?;
        result_rx.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Replace the whole state as a local change
    pub async fn replace(&self, snapshot: Snapshot) -> SyncResult<()> {
        self.mutate(move |state| *state = snapshot).await
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Current reconciliation phase
    pub fn phase(&self) -> ReconciliationPhase {
        *self.phase.borrow()
    }

    /// Watch snapshot changes
    pub fn subscribe_state(&self) -> watch::Receiver<Snapshot> {
        self.state.clone()
    }

    /// Watch connection status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Watch reconciliation phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<ReconciliationPhase> {
        self.phase.clone()
    }

    /// Wait until startup has finished (LOCAL_ONLY, LIVE or OFFLINE)
    pub async fn wait_settled(&self) -> SyncResult<ReconciliationPhase> {
        let mut phase = self.phase.clone();
        let settled = phase
            .wait_for(|phase| phase.is_settled())
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        Ok(*settled)
    }

    /// Push any pending change now, wait for pushes in flight, and stop
    pub async fn shutdown(self) -> SyncResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Shutdown(done_tx))
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        done_rx.await.map_err(|_| SyncError::EngineStopped)
    }
}
