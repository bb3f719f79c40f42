//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines and tables
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Print a single item as pretty JSON.
pub fn print_single<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print `data` as JSON, or run `text` to render it for humans.
pub fn print_with<T: Serialize>(
    data: &T,
    format: OutputFormat,
    text: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_single(data),
        OutputFormat::Text => {
            text(data);
            Ok(())
        }
    }
}

/// Render rows as a table, or a dimmed placeholder when there are none.
pub fn render_table<T: Tabled>(rows: Vec<T>) -> String {
    if rows.is_empty() {
        "No results".dimmed().to_string()
    } else {
        Table::new(rows).to_string()
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}
