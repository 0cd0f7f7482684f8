//! Sync credentials
//!
//! The (endpoint, access key) pair used to reach the remote document store.
//! Absence is not an error: it means the process runs local-only.

use std::fmt;

use crate::config::Config;

/// Endpoint and access key of the remote document store
#[derive(Clone, PartialEq, Eq)]
pub struct SyncCredentials {
    endpoint: String,
    key: String,
}

impl SyncCredentials {
    /// Create credentials from raw values
    ///
    /// Returns `None` unless both values are non-empty after trimming.
    pub fn new(endpoint: &str, key: &str) -> Option<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let key = key.trim();
        if endpoint.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        })
    }

    /// Resolve credentials from configuration
    pub fn resolve(config: &Config) -> Option<Self> {
        let endpoint = config.sync_endpoint.as_deref()?;
        let key = config.sync_key.as_deref()?;
        Self::new(endpoint, key)
    }

    /// Base URL of the remote service, without trailing slash
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Access key
    pub fn key(&self) -> &str {
        &self.key
    }
}

// Keep the access key out of logs
impl fmt::Debug for SyncCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCredentials")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unconfigured() {
        let config = Config::default();
        assert!(SyncCredentials::resolve(&config).is_none());
    }

    #[test]
    fn test_resolve_requires_both_values() {
        let config = Config {
            sync_endpoint: Some("https://db.example.com".to_string()),
            sync_key: None,
            ..Config::default()
        };
        assert!(SyncCredentials::resolve(&config).is_none());

        let config = Config {
            sync_endpoint: Some("https://db.example.com".to_string()),
            sync_key: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(SyncCredentials::resolve(&config).is_none());
    }

    #[test]
    fn test_resolve_normalizes_endpoint() {
        let config = Config {
            sync_endpoint: Some(" https://db.example.com/ ".to_string()),
            sync_key: Some("anon".to_string()),
            ..Config::default()
        };
        let creds = SyncCredentials::resolve(&config).unwrap();
        assert_eq!(creds.endpoint(), "https://db.example.com");
        assert_eq!(creds.key(), "anon");
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = SyncCredentials::new("https://db.example.com", "very-secret").unwrap();
        let shown = format!("{:?}", creds);
        assert!(shown.contains("db.example.com"));
        assert!(!shown.contains("very-secret"));
    }
}
