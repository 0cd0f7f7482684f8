//! Connection status state machine
//!
//! ```text
//! OFFLINE --PullStarted--> CONNECTING --Established--> LIVE
//!                          CONNECTING --Failed-------> OFFLINE
//! ```
//!
//! There is no heartbeat or reconnect logic: once LIVE, the status only
//! changes through a process restart.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connection status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Not connected (local-only, or the first pull failed)
    Offline,
    /// Initial pull in progress
    Connecting,
    /// Reconciled and subscribed to remote changes
    Live,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Offline => write!(f, "OFFLINE"),
            ConnectionStatus::Connecting => write!(f, "CONNECTING"),
            ConnectionStatus::Live => write!(f, "LIVE"),
        }
    }
}

/// Events that drive status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The initial pull was issued
    PullStarted,
    /// Pull succeeded and the change listener is registered
    Established,
    /// Pull or subscription failed
    Failed,
}

impl ConnectionStatus {
    /// Next status for an event, or `None` if the event is not valid here
    pub fn next(self, event: StatusEvent) -> Option<ConnectionStatus> {
        match (self, event) {
            (ConnectionStatus::Offline, StatusEvent::PullStarted) => {
                Some(ConnectionStatus::Connecting)
            }
            (ConnectionStatus::Connecting, StatusEvent::Established) => {
                Some(ConnectionStatus::Live)
            }
            (ConnectionStatus::Connecting, StatusEvent::Failed) => {
                Some(ConnectionStatus::Offline)
            }
            _ => None,
        }
    }
}

/// Holder of the current status, observable through a watch channel
#[derive(Debug)]
pub struct StatusMachine {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    /// Start OFFLINE
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Offline);
        Self { tx }
    }

    /// Current status
    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Apply an event; returns false (and changes nothing) if it is invalid
    pub fn apply(&self, event: StatusEvent) -> bool {
        let current = self.current();
        match current.next(event) {
            Some(next) => {
                info!(from = %current, to = %next, "Connection status changed");
                self.tx.send_replace(next);
                true
            }
            None => {
                warn!(status = %current, ?event, "Ignoring invalid status transition");
                false
            }
        }
    }
}
