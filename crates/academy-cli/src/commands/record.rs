//! Record command handlers (add, remove)

use anyhow::{bail, Context, Result};
use serde_json::Value;

use academy_core::{Config, ConnectionStatus};

use super::{ensure_collection, open_engine};
use crate::output::Output;

/// Add a record to a collection, or replace the one with the same id
pub async fn add(config: &Config, collection: String, json: String, output: &Output) -> Result<()> {
    ensure_collection(&collection)?;
    let record: Value = serde_json::from_str(&json).context("Record is not valid JSON")?;

    let engine = open_engine(config, output).await?;
    let name = collection.clone();
    let id = engine
        .mutate(move |state| state.upsert_record(&name, record))
        .await??;
    let status = engine.status();
    engine.shutdown().await?;

    output.success(&format!("Saved {} record {}", collection, id));
    report_sync(status, output);
    if output.is_quiet() {
        println!("{}", id);
    }

    Ok(())
}

/// Remove a record from a collection
pub async fn remove(config: &Config, collection: String, id: String, output: &Output) -> Result<()> {
    ensure_collection(&collection)?;

    let engine = open_engine(config, output).await?;
    let name = collection.clone();
    let target = id.clone();
    let removed = engine
        .mutate(move |state| state.remove_record(&name, &target))
        .await??;
    let status = engine.status();
    engine.shutdown().await?;

    if !removed {
        bail!("No record '{}' in {}", id, collection);
    }
    output.success(&format!("Removed {} record {}", collection, id));
    report_sync(status, output);

    Ok(())
}

fn report_sync(status: ConnectionStatus, output: &Output) {
    if status != ConnectionStatus::Live {
        output.message(&format!("Saved locally only (sync {}).", status));
    }
}
