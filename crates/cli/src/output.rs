//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse a config-file value, ignoring unknown names
    pub fn from_config(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| <Self as ValueEnum>::from_str(v, true).ok())
    }
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an RFC 3339 timestamp as `YYYY-MM-DD HH:MM` UTC
pub fn format_time(ts: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => ts.to_string(),
    }
}

pub fn format_demand(value: f64) -> String {
    format!("{:.2}", value)
}

/// Format an uncertainty band as `[lo, hi]`
pub fn format_range(range: [f64; 2]) -> String {
    format!("[{:.2}, {:.2}]", range[0], range[1])
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ok" | "true" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "false" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Highlight unserved demand
pub fn color_unserved(unserved: f64) -> String {
    let formatted = format!("{:.1}", unserved);
    if unserved > 0.0 {
        formatted.red().to_string()
    } else {
        formatted.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time("2024-01-01T01:00:00Z"), "2024-01-01 01:00");
        assert_eq!(format_time("2024-01-01T03:00:00+02:00"), "2024-01-01 01:00");
        assert_eq!(format_time("garbage"), "garbage");
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range([39.0, 63.5]), "[39.00, 63.50]");
    }

    #[test]
    fn test_format_from_config() {
        assert_eq!(OutputFormat::from_config(Some("JSON")), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_config(Some("yaml")), None);
        assert_eq!(OutputFormat::from_config(None), None);
    }
}
