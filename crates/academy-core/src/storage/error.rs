//! Local store errors
//!
//! Each I/O failure records what the store was doing and which file under the
//! data directory it touched, so one warning line is enough to find the file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Linux and macOS both report a full disk as errno 28
const ENOSPC: i32 = 28;

/// File operation the local store was performing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Write,
    CreateDir,
    Rename,
    Remove,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            StoreOp::Read => "read",
            StoreOp::Write => "write",
            StoreOp::CreateDir => "create directory",
            StoreOp::Rename => "move into place",
            StoreOp::Remove => "remove",
        };
        f.write_str(verb)
    }
}

/// Errors from reading or writing the state document and the current user
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not allowed to {op} '{path}'")]
    AccessDenied {
        op: StoreOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Out of disk space trying to {op} '{path}'")]
    NoSpace {
        op: StoreOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not {op} '{path}': {source}")]
    Io {
        op: StoreOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The state document exists but is not a JSON object
    #[error("State document '{path}' is unreadable: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("Could not encode for storage: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    /// Wrap an I/O failure of `op` on `path`
    pub fn io(op: StoreOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            StorageError::AccessDenied { op, path, source }
        } else if is_out_of_space(&source) {
            StorageError::NoSpace { op, path, source }
        } else {
            StorageError::Io { op, path, source }
        }
    }

    /// File the failure concerns, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageError::AccessDenied { path, .. }
            | StorageError::NoSpace { path, .. }
            | StorageError::Io { path, .. }
            | StorageError::Corrupt { path, .. } => Some(path.as_path()),
            StorageError::Encode(_) => None,
        }
    }

    /// What the user can do about it, for the log line
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            StorageError::AccessDenied { .. } => Some(
                "Make the data directory writable, or move it with ACADEMY_DATA_DIR \
                 or `academy config set data_dir <path>`.",
            ),
            StorageError::NoSpace { .. } => Some(
                "Edits stay in memory and are written with the next change \
                 once space is freed.",
            ),
            StorageError::Corrupt { .. } => Some(
                "The unreadable document was moved to state.json.corrupt; \
                 the records started empty.",
            ),
            StorageError::Io { .. } | StorageError::Encode(_) => None,
        }
    }
}

fn is_out_of_space(error: &io::Error) -> bool {
    if cfg!(unix) && error.raw_os_error() == Some(ENOSPC) {
        return true;
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

/// Result type for local store operations
pub type StorageResult<T> = Result<T, StorageError>;
