//! Watch command handler
//!
//! Stays connected, printing status changes and inbound state changes until
//! interrupted.

use anyhow::Result;
use tracing::debug;

use academy_core::Config;

use super::open_engine;
use crate::output::Output;

/// Follow the shared state until Ctrl-C
pub async fn watch(config: &Config, output: &Output) -> Result<()> {
    let engine = open_engine(config, output).await?;
    let mut status = engine.subscribe_status();
    let mut state = engine.subscribe_state();

    output.print_status_change(*status.borrow_and_update());
    output.print_counts(&state.borrow_and_update().collection_counts());
    output.message("Watching for changes (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                output.print_status_change(*status.borrow_and_update());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let counts = state.borrow_and_update().collection_counts();
                output.message("State changed:");
                output.print_counts(&counts);
            }
        }
    }

    engine.shutdown().await?;
    Ok(())
}
