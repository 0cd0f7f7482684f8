//! Local state persistence
//!
//! Handles saving and loading the state document to/from the filesystem.
//! Uses atomic writes (write to temp file, then rename) to prevent corruption.
//!
//! Storage location: `~/.local/share/academy/` (configurable via `Config`)
//!
//! Files:
//! - `state.json` - The full state document
//! - `current_user.json` - The user signed in on this device

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{StorageError, StorageResult, StoreOp};
use crate::config::Config;
use crate::models::CurrentUser;
use crate::snapshot::Snapshot;

/// Suffix given to a state file that could not be parsed
const CORRUPT_SUFFIX: &str = "corrupt";

/// Local store for the state document
///
/// Reads never fail observably: a missing or unreadable document yields the
/// default snapshot. Writes through [`LocalStore::save`] are best-effort.
#[derive(Debug, Clone)]
pub struct LocalStore {
    state_path: PathBuf,
    current_user_path: PathBuf,
}

impl LocalStore {
    /// Create a store using the paths from the configuration
    pub fn new(config: &Config) -> Self {
        Self {
            state_path: config.state_path(),
            current_user_path: config.current_user_path(),
        }
    }

    /// Path of the state document
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Check if a state document exists on disk
    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }

    /// Load the state document, falling back to the default snapshot
    ///
    /// An unparseable document is moved aside to `state.json.corrupt`.
    pub fn load(&self) -> Snapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No local state document, starting from default");
                Snapshot::default()
            }
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!(error = %e, "Local state document unreadable, using default");
                self.quarantine();
                Snapshot::default()
            }
            Err(e) => {
                warn!(
                    error = %e,
                    suggestion = e.hint().unwrap_or(""),
                    "Failed to read local state document, using default"
                );
                Snapshot::default()
            }
        }
    }

    /// Load the state document, reporting failures
    ///
    /// Returns `None` if the document file doesn't exist.
    pub fn try_load(&self) -> StorageResult<Option<Snapshot>> {
        let text = match fs::read_to_string(&self.state_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(StoreOp::Read, &self.state_path, e)),
        };

        Snapshot::from_json_str(&text)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: self.state_path.clone(),
                details: e.to_string(),
            })
    }

    /// Save the state document; failures are logged and swallowed
    pub fn save(&self, snapshot: &Snapshot) {
        if let Err(e) = self.try_save(snapshot) {
            warn!(
                error = %e,
                suggestion = e.hint().unwrap_or(""),
                "Failed to persist state locally"
            );
        }
    }

    /// Save the state document using atomic write
    pub fn try_save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        atomic_write(&self.state_path, &bytes)
    }

    /// Load the current-user record, if one was saved and is readable
    pub fn load_current_user(&self) -> Option<CurrentUser> {
        let text = fs::read_to_string(&self.current_user_path).ok()?;
        match serde_json::from_str(&text) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable current user record");
                None
            }
        }
    }

    /// Save the current-user record
    pub fn save_current_user(&self, user: &CurrentUser) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(user)?;
        atomic_write(&self.current_user_path, &bytes)
    }

    /// Remove the current-user record
    pub fn clear_current_user(&self) -> StorageResult<()> {
        match fs::remove_file(&self.current_user_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(StoreOp::Remove, &self.current_user_path, e)),
        }
    }

    fn quarantine(&self) {
        let target = corrupt_path(&self.state_path);
        match fs::rename(&self.state_path, &target) {
            Ok(()) => warn!(path = ?target, "Kept unreadable state document"),
            Err(e) => warn!(error = %e, "Failed to move unreadable state document aside"),
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(CORRUPT_SUFFIX);
    PathBuf::from(name)
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(StoreOp::CreateDir, parent, e))?;
    }

    // Same directory, so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let write_error = |e| StorageError::io(StoreOp::Write, &temp_path, e);
    let mut file = File::create(&temp_path).map_err(write_error)?;
    file.write_all(data).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::io(StoreOp::Rename, path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(&test_config(&temp_dir));

        assert!(!store.exists());
        assert!(store.try_load().unwrap().is_none());
        assert_eq!(store.load(), Snapshot::default());

        let mut snapshot = Snapshot::default();
        snapshot
            .upsert_record("students", json!({"id": "s1", "name": "Ana"}))
            .unwrap();
        store.save(&snapshot);
        assert!(store.exists());

        // A second store over the same directory sees the data (restart)
        let reopened = LocalStore::new(&test_config(&temp_dir));
        assert_eq!(reopened.load(), snapshot);
    }

    #[test]
    fn test_corrupted_document_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(&test_config(&temp_dir));
        fs::write(store.state_path(), "{ not json").unwrap();

        assert!(matches!(
            store.try_load(),
            Err(StorageError::Corrupt { .. })
        ));
        assert_eq!(store.load(), Snapshot::default());

        // The unreadable file is kept aside, not deleted
        assert!(!store.exists());
        let kept = fs::read_to_string(temp_dir.path().join("state.json.corrupt")).unwrap();
        assert_eq!(kept, "{ not json");
    }

    #[test]
    fn test_non_object_document_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(&test_config(&temp_dir));
        fs::write(store.state_path(), "[1, 2, 3]").unwrap();

        assert_eq!(store.load(), Snapshot::default());
    }

    #[test]
    fn test_partial_document_is_merged_onto_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(&test_config(&temp_dir));
        fs::write(
            store.state_path(),
            r#"{"students": [{"id": "s1"}], "classes": 42}"#,
        )
        .unwrap();

        let snapshot = store.load();
        assert_eq!(snapshot.records("students").len(), 1);
        assert!(snapshot.records("classes").is_empty());
        assert!(snapshot.get("consultations").is_some());
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // data_dir is a regular file, so no directory can be created under it
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let config = Config {
            data_dir: blocker.join("data"),
            ..Config::default()
        };
        let store = LocalStore::new(&config);

        assert!(store.try_save(&Snapshot::default()).is_err());
        store.save(&Snapshot::default());
        assert_eq!(store.load(), Snapshot::default());
    }

    #[test]
    fn test_current_user_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(&test_config(&temp_dir));

        assert!(store.load_current_user().is_none());

        let user = CurrentUser::new("Marta").with_role("admin");
        store.save_current_user(&user).unwrap();
        assert_eq!(store.load_current_user(), Some(user));

        store.clear_current_user().unwrap();
        assert!(store.load_current_user().is_none());
        // Clearing twice is fine
        store.clear_current_user().unwrap();
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("file.json");

        atomic_write(&nested_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "{}");
        assert!(!nested_path.with_extension("tmp").exists());
    }
}
