//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::Value;

use academy_core::{ConnectionStatus, CurrentUser};

/// Fields tried, in order, to label a record in human output
const LABEL_FIELDS: &[&str] = &["name", "title", "student_name", "date", "status"];

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the records of one collection
    pub fn print_records(&self, collection: &str, records: &[Value]) {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No {} found.", collection);
                    return;
                }
                for record in records {
                    println!(
                        "{} | {}",
                        truncate(&record_id(record), 12),
                        truncate(&record_label(record), 60)
                    );
                }
                println!("\n{} record(s) in {}", records.len(), collection);
            }
            OutputFormat::Json => print_json(&Value::Array(records.to_vec())),
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record_id(record));
                }
            }
        }
    }

    /// Print per-collection record counts
    pub fn print_counts(&self, counts: &[(String, usize)]) {
        match self.format {
            OutputFormat::Human => {
                for (name, count) in counts {
                    println!("{:<15} {}", name, count);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, Value> = counts
                    .iter()
                    .map(|(name, count)| (name.clone(), Value::from(*count)))
                    .collect();
                print_json(&Value::Object(map));
            }
            OutputFormat::Quiet => {
                let total: usize = counts.iter().map(|(_, count)| count).sum();
                println!("{}", total);
            }
        }
    }

    /// Print a connection status change
    pub fn print_status_change(&self, status: ConnectionStatus) {
        match self.format {
            OutputFormat::Human => println!("● {}", status),
            OutputFormat::Json => print_json(&serde_json::json!({"status": status})),
            OutputFormat::Quiet => println!("{}", status),
        }
    }

    /// Print the current user record
    pub fn print_user(&self, user: Option<&CurrentUser>) {
        match (self.format, user) {
            (OutputFormat::Human, Some(user)) => {
                println!("Name:      {}", user.name);
                if let Some(ref role) = user.role {
                    println!("Role:      {}", role);
                }
                println!("Signed in: {}", user.signed_in_at.format("%Y-%m-%d %H:%M"));
            }
            (OutputFormat::Human, None) => println!("No current user."),
            (OutputFormat::Json, user) => {
                print_json(&serde_json::to_value(user).unwrap_or(Value::Null))
            }
            (OutputFormat::Quiet, Some(user)) => println!("{}", user.name),
            (OutputFormat::Quiet, None) => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", msg);
        }
    }
}

/// Pretty-print a JSON value
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

/// Display form of a record's id
fn record_id(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "-".to_string(),
    }
}

/// Short human label for a record
fn record_label(record: &Value) -> String {
    LABEL_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| record.to_string())
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
