//! Academy Core Library
//!
//! Local-first state for the academy management app: one JSON document
//! holding every collection (students, classes, attendance, progress,
//! consultations), persisted locally and kept in step with a shared remote
//! copy when sync credentials are configured.
//!
//! # Architecture
//!
//! - **Local store**: source of availability; every change is written to disk
//!   before anything touches the network
//! - **Remote document**: source of truth once reachable; the first pull
//!   overwrites local state, later remote changes overwrite it again
//! - **Sync engine**: single writer that serializes local and remote changes
//!   and pushes local ones after a debounce window
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let engine = start_engine(&config)?;
//! engine.wait_settled().await?;
//!
//! engine.mutate(|state| state.upsert_record("students", record)).await??;
//! println!("{}", engine.status());
//!
//! engine.shutdown().await?;
//! ```
//!
//! # Modules
//!
//! - `snapshot`: The state document and its record helpers
//! - `models`: The current user record
//! - `storage`: Local persistence
//! - `credentials`: Sync credential resolution
//! - `sync`: Remote client, reconciliation and the sync engine
//! - `config`: Application configuration

pub mod config;
pub mod credentials;
pub mod models;
pub mod snapshot;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use credentials::SyncCredentials;
pub use models::CurrentUser;
pub use snapshot::{Snapshot, SnapshotError, COLLECTIONS};
pub use storage::{LocalStore, StorageError};
pub use sync::{start_engine, ConnectionStatus, EngineHandle, ReconciliationPhase, SyncError};
