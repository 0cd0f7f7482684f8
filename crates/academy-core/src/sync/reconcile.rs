//! Initial reconciliation
//!
//! Startup sequence of the engine, as an explicit state machine:
//!
//! ```text
//! START --no credentials--> LOCAL_ONLY
//! START --credentials-----> PULLING --ok--> SUBSCRIBING --ok--> LIVE
//!                           PULLING --err-> OFFLINE
//!                                           SUBSCRIBING --err-> OFFLINE
//! ```
//!
//! The reconciliation guard is the set of phases before the first pull has
//! resolved. No push may be sent while it holds. A failed pull clears it too;
//! pushes are then still gated on LIVE status.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::status::{ConnectionStatus, StatusEvent, StatusMachine};

/// Phase of the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationPhase {
    Start,
    LocalOnly,
    Pulling,
    Subscribing,
    Live,
    Offline,
}

/// Step that advances the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    NoCredentials,
    CredentialsFound,
    PullSucceeded,
    PullFailed,
    Subscribed,
    SubscribeFailed,
}

impl fmt::Display for ReconciliationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconciliationPhase::Start => "START",
            ReconciliationPhase::LocalOnly => "LOCAL_ONLY",
            ReconciliationPhase::Pulling => "PULLING",
            ReconciliationPhase::Subscribing => "SUBSCRIBING",
            ReconciliationPhase::Live => "LIVE",
            ReconciliationPhase::Offline => "OFFLINE",
        };
        f.write_str(name)
    }
}

impl ReconciliationPhase {
    /// Next phase for a step, or `None` if the step is not valid here
    pub fn advance(self, step: ReconcileStep) -> Option<ReconciliationPhase> {
        use ReconcileStep::*;
        use ReconciliationPhase::*;

        match (self, step) {
            (Start, NoCredentials) => Some(LocalOnly),
            (Start, CredentialsFound) => Some(Pulling),
            (Pulling, PullSucceeded) => Some(Subscribing),
            (Pulling, PullFailed) => Some(Offline),
            (Subscribing, Subscribed) => Some(Live),
            (Subscribing, SubscribeFailed) => Some(Offline),
            _ => None,
        }
    }

    /// Whether the reconciliation guard holds (first pull not yet resolved)
    pub fn guard_active(self) -> bool {
        matches!(
            self,
            ReconciliationPhase::Start
                | ReconciliationPhase::LocalOnly
                | ReconciliationPhase::Pulling
        )
    }

    /// Whether inbound change notifications are applied in this phase
    pub fn accepts_notifications(self) -> bool {
        matches!(
            self,
            ReconciliationPhase::Subscribing | ReconciliationPhase::Live
        )
    }

    /// Whether the startup sequence has finished
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            ReconciliationPhase::LocalOnly
                | ReconciliationPhase::Live
                | ReconciliationPhase::Offline
        )
    }

    fn status_event(self) -> Option<StatusEvent> {
        match self {
            ReconciliationPhase::Pulling => Some(StatusEvent::PullStarted),
            ReconciliationPhase::Live => Some(StatusEvent::Established),
            ReconciliationPhase::Offline => Some(StatusEvent::Failed),
            _ => None,
        }
    }
}

/// Startup sequence state plus the connection status it drives
#[derive(Debug)]
pub struct Reconciliation {
    phase: watch::Sender<ReconciliationPhase>,
    status: StatusMachine,
}

impl Default for Reconciliation {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciliation {
    /// Start in START / OFFLINE
    pub fn new() -> Self {
        let (phase, _rx) = watch::channel(ReconciliationPhase::Start);
        Self {
            phase,
            status: StatusMachine::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> ReconciliationPhase {
        *self.phase.borrow()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// Watch phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<ReconciliationPhase> {
        self.phase.subscribe()
    }

    /// Watch status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Advance the sequence; returns false (and changes nothing) if invalid
    pub fn advance(&self, step: ReconcileStep) -> bool {
        let current = self.phase();
        let Some(next) = current.advance(step) else {
            warn!(phase = %current, ?step, "Ignoring invalid reconciliation step");
            return false;
        };

        debug!(from = %current, to = %next, "Reconciliation phase changed");
        self.phase.send_replace(next);
        if let Some(event) = next.status_event() {
            self.status.apply(event);
        }
        true
    }

    /// Whether a push may be scheduled now
    pub fn push_permitted(&self) -> bool {
        !self.phase().guard_active() && self.status() == ConnectionStatus::Live
    }

    /// Whether an inbound change notification should be applied now
    pub fn accepts_notifications(&self) -> bool {
        self.phase().accepts_notifications()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReconcileStep::*;

    #[test]
    fn test_local_only_path() {
        let reconciliation = Reconciliation::new();
        assert!(reconciliation.advance(NoCredentials));

        assert_eq!(reconciliation.phase(), ReconciliationPhase::LocalOnly);
        assert_eq!(reconciliation.status(), ConnectionStatus::Offline);
        assert!(reconciliation.phase().is_settled());
        assert!(!reconciliation.push_permitted());

        // Terminal: nothing moves it on
        assert!(!reconciliation.advance(CredentialsFound));
        assert!(!reconciliation.advance(PullSucceeded));
    }

    #[test]
    fn test_successful_path() {
        let reconciliation = Reconciliation::new();

        assert!(reconciliation.advance(CredentialsFound));
        assert_eq!(reconciliation.status(), ConnectionStatus::Connecting);
        assert!(reconciliation.phase().guard_active());
        assert!(!reconciliation.accepts_notifications());

        assert!(reconciliation.advance(PullSucceeded));
        assert_eq!(reconciliation.phase(), ReconciliationPhase::Subscribing);
        assert!(!reconciliation.phase().guard_active());
        assert!(reconciliation.accepts_notifications());
        // Guard cleared but not LIVE yet
        assert!(!reconciliation.push_permitted());

        assert!(reconciliation.advance(Subscribed));
        assert_eq!(reconciliation.status(), ConnectionStatus::Live);
        assert!(reconciliation.push_permitted());
    }

    #[test]
    fn test_pull_failure_clears_guard_but_stays_offline() {
        let reconciliation = Reconciliation::new();
        reconciliation.advance(CredentialsFound);
        assert!(reconciliation.advance(PullFailed));

        assert_eq!(reconciliation.phase(), ReconciliationPhase::Offline);
        assert!(!reconciliation.phase().guard_active());
        assert_eq!(reconciliation.status(), ConnectionStatus::Offline);
        assert!(!reconciliation.push_permitted());
        assert!(!reconciliation.accepts_notifications());
        // No automatic retry
        assert!(!reconciliation.advance(CredentialsFound));
    }

    #[test]
    fn test_subscribe_failure_goes_offline() {
        let reconciliation = Reconciliation::new();
        reconciliation.advance(CredentialsFound);
        reconciliation.advance(PullSucceeded);
        assert!(reconciliation.advance(SubscribeFailed));

        assert_eq!(reconciliation.phase(), ReconciliationPhase::Offline);
        assert_eq!(reconciliation.status(), ConnectionStatus::Offline);
    }

    #[test]
    fn test_phase_watch() {
        let reconciliation = Reconciliation::new();
        let rx = reconciliation.subscribe_phase();
        reconciliation.advance(CredentialsFound);
        assert_eq!(*rx.borrow(), ReconciliationPhase::Pulling);
    }
}
