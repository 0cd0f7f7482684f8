//! Data models persisted alongside the state document
//!
//! The entity collections themselves live inside the [`Snapshot`](crate::Snapshot).
//! The current-user record is device-local and never synchronized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The user signed in on this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    /// Display name
    pub name: String,
    /// Role within the academy (e.g. "admin", "teacher")
    #[serde(default)]
    pub role: Option<String>,
    /// When this user signed in on this device
    pub signed_in_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Create a user record signed in now
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            signed_in_at: Utc::now(),
        }
    }

    /// Set the role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
