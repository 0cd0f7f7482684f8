//! Command handlers

pub mod config;
pub mod record;
pub mod show;
pub mod status;
pub mod user;
pub mod watch;

use anyhow::{bail, Context, Result};

use academy_core::{start_engine, Config, EngineHandle, ReconciliationPhase, COLLECTIONS};

use crate::output::Output;

/// Start the sync engine and wait for startup to finish
///
/// Never fails because the remote is unreachable; that only shows up as an
/// OFFLINE status.
pub async fn open_engine(config: &Config, output: &Output) -> Result<EngineHandle> {
    let engine = start_engine(config).context("Failed to start sync engine")?;
    let phase = engine
        .wait_settled()
        .await
        .context("Sync engine stopped during startup")?;

    if phase == ReconciliationPhase::Offline {
        output.warn("Remote unreachable; working offline. Changes are saved locally.");
    }
    Ok(engine)
}

/// Check that a collection name is one the app knows
pub fn ensure_collection(name: &str) -> Result<()> {
    if !COLLECTIONS.contains(&name) {
        bail!(
            "Unknown collection: '{}'\nValid collections: {}",
            name,
            COLLECTIONS.join(", ")
        );
    }
    Ok(())
}
