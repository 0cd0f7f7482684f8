//! State synchronization with the shared remote document
//!
//! Keeps the local state snapshot and a single remote document in step:
//!
//! 1. Load the local snapshot (default on any failure)
//! 2. Without credentials, stay local-only
//! 3. Otherwise pull the remote document and overwrite local state with it
//! 4. Subscribe to remote changes and apply each one as a full overwrite
//! 5. Push local changes after a debounce window, once reconciled and LIVE
//!
//! ## Usage
//!
//! ```ignore
//! let engine = start_engine(&config)?;
//! engine.wait_settled().await?;
//! engine.mutate(|state| state.upsert_record("students", record)).await??;
//! engine.shutdown().await?;
//! ```

mod client;
mod engine;
mod error;
mod memory;
mod message;
mod reconcile;
mod remote;
mod scheduler;
mod status;

pub use client::RemoteClient;
pub use engine::{spawn_engine, start_engine, EngineHandle};
pub use error::{SyncError, SyncResult};
pub use memory::{MemoryRemote, PushRecord};
pub use message::ChangeNotification;
pub use reconcile::{ReconcileStep, Reconciliation, ReconciliationPhase};
pub use remote::{NotificationSink, RemoteStore, Subscription};
pub use scheduler::PushScheduler;
pub use status::{ConnectionStatus, StatusEvent, StatusMachine};
