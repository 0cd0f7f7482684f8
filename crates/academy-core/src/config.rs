//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/academy/config.toml)
//! 3. Environment variables (ACADEMY_* prefix)
//!
//! Environment variables take precedence over config file values.
//! Sync credentials are read once at startup; changing them requires a restart.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "ACADEMY";

/// Remote table holding the shared state row
pub const DEFAULT_SYNC_TABLE: &str = "app_state";

/// Fixed key of the single shared state document
pub const DEFAULT_DOCUMENT_KEY: &str = "global_state";

/// Default debounce window before a local change is pushed
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (state document, current user)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote document service endpoint (optional)
    #[serde(default)]
    pub sync_endpoint: Option<String>,

    /// Access key for the remote document service (optional)
    #[serde(default)]
    pub sync_key: Option<String>,

    /// Remote table name
    #[serde(default = "default_sync_table")]
    pub sync_table: String,

    /// Key of the shared document row
    #[serde(default = "default_document_key")]
    pub document_key: String,

    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Timeout for remote HTTP requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log file path (logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_endpoint: None,
            sync_key: None,
            sync_table: default_sync_table(),
            document_key: default_document_key(),
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (ACADEMY_DATA_DIR, ACADEMY_SYNC_ENDPOINT, ...)
    /// 2. Config file (~/.config/academy/config.toml or ACADEMY_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the credential
        if let Ok(val) = std::env::var(format!("{}_SYNC_ENDPOINT", ENV_PREFIX)) {
            self.sync_endpoint = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_KEY", ENV_PREFIX)) {
            self.sync_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.debounce_ms = ms;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with ACADEMY_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("academy")
            .join("config.toml")
    }

    /// Path of the persisted state document
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Path of the persisted current-user record
    pub fn current_user_path(&self) -> PathBuf {
        self.data_dir.join("current_user.json")
    }

    /// Debounce window as a `Duration`
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// HTTP request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("academy")
}

fn default_sync_table() -> String {
    DEFAULT_SYNC_TABLE.to_string()
}

fn default_document_key() -> String {
    DEFAULT_DOCUMENT_KEY.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "ACADEMY_DATA_DIR",
        "ACADEMY_SYNC_ENDPOINT",
        "ACADEMY_SYNC_KEY",
        "ACADEMY_DEBOUNCE_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sync_endpoint.is_none());
        assert!(config.sync_key.is_none());
        assert_eq!(config.sync_table, "app_state");
        assert_eq!(config.document_key, "global_state");
        assert_eq!(config.debounce_window(), Duration::from_millis(1000));
        assert!(config.data_dir.ends_with("academy"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.state_path().ends_with("state.json"));
        assert!(config.current_user_path().ends_with("current_user.json"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("ACADEMY_DATA_DIR", "/tmp/academy-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/academy-test"));
    }

    #[test]
    fn test_env_override_credentials() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("ACADEMY_SYNC_ENDPOINT", "https://db.example.com");
        env::set_var("ACADEMY_SYNC_KEY", "anon-key");
        config.apply_env_overrides();
        assert_eq!(
            config.sync_endpoint.as_deref(),
            Some("https://db.example.com")
        );
        assert_eq!(config.sync_key.as_deref(), Some("anon-key"));

        // Empty string clears it
        env::set_var("ACADEMY_SYNC_KEY", "");
        config.apply_env_overrides();
        assert!(config.sync_key.is_none());
    }

    #[test]
    fn test_env_override_debounce_ignores_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("ACADEMY_DEBOUNCE_MS", "250");
        config.apply_env_overrides();
        assert_eq!(config.debounce_ms, 250);

        env::set_var("ACADEMY_DEBOUNCE_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.debounce_ms, 250);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/academy"),
            sync_endpoint: Some("https://db.example.com".to_string()),
            sync_key: Some("secret".to_string()),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("sync_endpoint"));
        assert!(toml_str.contains("debounce_ms"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.sync_endpoint, config.sync_endpoint);
        assert_eq!(parsed.sync_key, config.sync_key);
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            sync_endpoint = "https://db.example.com"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(
            config.sync_endpoint.as_deref(),
            Some("https://db.example.com")
        );
        assert!(config.sync_key.is_none());
        assert_eq!(config.document_key, "global_state");
        assert_eq!(config.debounce_ms, 1000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("ACADEMY_DATA_DIR", temp_dir.path());

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.sync_endpoint.is_none());
        assert_eq!(config.data_dir, temp_dir.path());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            debounce_ms: 400,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.debounce_ms, 400);
        assert!(loaded.data_dir.exists());
    }
}
