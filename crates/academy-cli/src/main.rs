//! Academy CLI
//!
//! Command-line interface for the academy records: local-first state with
//! live sync to a shared remote document.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use academy_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "academy")]
#[command(about = "Academy - local-first student and class records with live sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync status and record counts
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show records of a collection, or a summary of all collections
    #[command(alias = "ls")]
    Show {
        /// Collection (students, classes, attendance, progress, consultations)
        collection: Option<String>,
    },
    /// Add a record, or replace the one with the same id
    Add {
        /// Collection to add to
        collection: String,
        /// Record as a JSON object
        record: String,
    },
    /// Remove a record
    #[command(alias = "rm")]
    Remove {
        /// Collection to remove from
        collection: String,
        /// Record id
        id: String,
    },
    /// Show or set the user signed in on this device
    User {
        #[command(subcommand)]
        command: Option<UserCommands>,
    },
    /// Stay connected and report changes until interrupted
    Watch,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, sync_endpoint, sync_key, debounce_ms, ...)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[derive(Subcommand, Clone)]
enum UserCommands {
    /// Show the current user
    Show,
    /// Sign a user in on this device
    Set {
        /// Display name
        name: String,
        /// Role (e.g. admin, teacher)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Sign the current user out
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work even when the config file is broken
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Config { .. } => Ok(()), // Handled above
        Commands::Status => commands::status::show(&config, &output).await,
        Commands::Show { collection } => commands::show::show(&config, collection, &output).await,
        Commands::Add { collection, record } => {
            commands::record::add(&config, collection, record, &output).await
        }
        Commands::Remove { collection, id } => {
            commands::record::remove(&config, collection, id, &output).await
        }
        Commands::User { command } => match command {
            Some(UserCommands::Show) | None => commands::user::show(&config, &output),
            Some(UserCommands::Set { name, role }) => {
                commands::user::set(&config, name, role, &output)
            }
            Some(UserCommands::Clear) => commands::user::clear(&config, &output),
        },
        Commands::Watch => commands::watch::watch(&config, &output).await,
    }
}

/// Initialize logging when ACADEMY_LOG is set
///
/// Logs go to the configured log file, or stderr when none is set.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("ACADEMY_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "academy_core={},academy_cli={}",
        log_level, log_level
    ));

    match config.log_file {
        Some(ref log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_global_flags() {
        let cli = Cli::parse_from([
            "academy",
            "add",
            "students",
            r#"{"name":"Ana"}"#,
            "--json",
        ]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Add { ref collection, .. } if collection == "students"
        ));
    }

    #[test]
    fn test_parse_user_set() {
        let cli = Cli::parse_from(["academy", "user", "set", "Marta", "--role", "admin"]);
        match cli.command {
            Commands::User {
                command: Some(UserCommands::Set { name, role }),
            } => {
                assert_eq!(name, "Marta");
                assert_eq!(role.as_deref(), Some("admin"));
            }
            _ => panic!("expected user set"),
        }
    }
}
