//! Sync error types

use thiserror::Error;

use crate::snapshot::SnapshotError;

/// Errors reported by the remote sync client and the engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// Could not reach the remote service
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Fetching the shared document failed
    #[error("Pull failed: {0}")]
    Pull(String),

    /// Upserting the shared document failed
    #[error("Push failed: {0}")]
    Push(String),

    /// Opening the change subscription failed
    #[error("Subscription failed: {0}")]
    Subscribe(String),

    /// An inbound change notification could not be used
    #[error("Malformed change notification: {0}")]
    MalformedNotification(String),

    /// The remote document is not a valid state document
    #[error("Malformed remote document: {0}")]
    MalformedDocument(#[from] SnapshotError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine task has stopped
    #[error("Sync engine is not running")]
    EngineStopped,
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
