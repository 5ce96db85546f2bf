//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Pretty-print any serializable value
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "processed" | "healthy" => status.green().to_string(),
        "no_data" | "no_alerts" | "degraded" => status.yellow().to_string(),
        "unhealthy" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_is_left_plain() {
        colored::control::set_override(false);
        assert_eq!(color_status("mystery"), "mystery");
        assert_eq!(color_status("processed"), "processed");
    }
}
