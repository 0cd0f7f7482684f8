//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use academy_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, sync_endpoint, sync_key, sync_table, document_key, \
                          debounce_ms, request_timeout_secs, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "sync_endpoint": config.sync_endpoint,
                    "sync_key": config.sync_key.as_deref().map(mask_secret),
                    "sync_table": config.sync_table,
                    "document_key": config.document_key,
                    "debounce_ms": config.debounce_ms,
                    "request_timeout_secs": config.request_timeout_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  sync_endpoint:        {}",
                config.sync_endpoint.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  sync_key:             {}",
                config
                    .sync_key
                    .as_deref()
                    .map(mask_secret)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  sync_table:           {}", config.sync_table);
            println!("  document_key:         {}", config.document_key);
            println!("  debounce_ms:          {}", config.debounce_ms);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply_setting(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "sync_key" {
        mask_secret(&value)
    } else {
        value
    };
    output.success(&format!("Set {} = {}", key, shown));
    if key.starts_with("sync_") || key == "document_key" {
        output.message("Restart running instances for sync changes to take effect.");
    }

    Ok(())
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "sync_endpoint" => {
            config.sync_endpoint = optional(value);
        }
        "sync_key" => {
            config.sync_key = optional(value);
        }
        "sync_table" => {
            if value.is_empty() {
                bail!("sync_table cannot be empty");
            }
            config.sync_table = value.to_string();
        }
        "document_key" => {
            if value.is_empty() {
                bail!("document_key cannot be empty");
            }
            config.document_key = value.to_string();
        }
        "debounce_ms" => {
            config.debounce_ms = value
                .parse()
                .context("Invalid value for debounce_ms. Use a number of milliseconds.")?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a number of seconds.")?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

/// Empty or "none" clears an optional setting
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Show only the last four characters of a secret
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
