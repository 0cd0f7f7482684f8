//! Status command handler

use anyhow::Result;

use academy_core::{Config, LocalStore, SyncCredentials};

use super::open_engine;
use crate::output::{Output, OutputFormat};

/// Show connection and storage status
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let credentials = SyncCredentials::resolve(config);
    let store = LocalStore::new(config);
    let user = store.load_current_user();

    let engine = open_engine(config, output).await?;
    let status = engine.status();
    let phase = engine.phase();
    let counts = engine.snapshot().collection_counts();
    engine.shutdown().await?;

    match output.format {
        OutputFormat::Json => {
            let counts: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(name, count)| (name.clone(), (*count).into()))
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "status": status,
                    "phase": phase,
                    "sync_endpoint": credentials.as_ref().map(SyncCredentials::endpoint),
                    "document_key": config.document_key,
                    "storage": {
                        "state_path": store.state_path(),
                        "state_exists": store.exists()
                    },
                    "current_user": user.as_ref().map(|u| &u.name),
                    "counts": counts
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", status);
        }
        OutputFormat::Human => {
            println!("Academy Status");
            println!("==============");
            println!();
            println!("Sync:");
            println!("  Status:   {}", status);
            match credentials {
                Some(ref credentials) => {
                    println!("  Endpoint: {}", credentials.endpoint());
                    println!(
                        "  Document: {}/{}",
                        config.sync_table, config.document_key
                    );
                }
                None => println!("  Not configured (local-only)"),
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", store.state_path().display());
            if let Some(ref user) = user {
                println!("  User:     {}", user.name);
            }
            println!();
            println!("Contents:");
            for (name, count) in &counts {
                println!("  {:<15} {}", name, count);
            }
        }
    }

    Ok(())
}
