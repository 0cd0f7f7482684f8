//! Show command handler

use anyhow::Result;

use academy_core::Config;

use super::{ensure_collection, open_engine};
use crate::output::{print_json, Output, OutputFormat};

/// Show one collection, or a summary of all of them
pub async fn show(config: &Config, collection: Option<String>, output: &Output) -> Result<()> {
    if let Some(ref name) = collection {
        ensure_collection(name)?;
    }

    let engine = open_engine(config, output).await?;
    let snapshot = engine.snapshot();
    engine.shutdown().await?;

    match collection {
        Some(name) => output.print_records(&name, snapshot.records(&name)),
        None if output.format == OutputFormat::Json => print_json(&snapshot.to_value()),
        None => output.print_counts(&snapshot.collection_counts()),
    }

    Ok(())
}
