//! Storage layer
//!
//! Durable local copy of the state document. Pure and synchronous: no network,
//! no async. The local copy is always treated as correct, whatever the state
//! of the remote replica.

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageResult, StoreOp};
pub use persistence::LocalStore;
