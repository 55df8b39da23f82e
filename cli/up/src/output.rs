//! Output formatting for CLI commands.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use upfleet_engine::{FleetEvent, Progress};
use upfleet_reconcile::PollObserver;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", format_json(data)),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data));
}

fn format_json<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message);
}

/// Renders engine progress as `> ` lines on stderr.
///
/// Countdowns rewrite a single line in place; the next event clears it.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    pending_line: AtomicBool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear_line(&self) {
        if self.pending_line.swap(false, Ordering::Relaxed) {
            eprint!("\r\x1b[2K");
        }
    }
}

impl PollObserver for ConsoleProgress {
    fn on_countdown(&self, name: &str, remaining: Duration) {
        self.pending_line.store(true, Ordering::Relaxed);
        eprint!(
            "\r\x1b[2K{} {}",
            ">".dimmed(),
            format!("Waiting for {name}, retrying in {}s", remaining.as_secs()).dimmed()
        );
        let _ = std::io::stderr().flush();
    }

    fn on_ready(&self, _name: &str, _attempts: u32) {
        self.clear_line();
    }
}

impl Progress for ConsoleProgress {
    fn event(&self, event: &FleetEvent<'_>) {
        self.clear_line();
        let line = event.to_string();
        if event.is_warning() {
            eprintln!("{} {}", ">".yellow(), line.yellow());
        } else {
            eprintln!("{} {}", ">".cyan(), line);
        }
    }
}

/// Renders an optional value, `-` when absent.
pub fn display_option<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_display_option() {
        assert_eq!(display_option(&Some(Ipv4Addr::new(10, 0, 0, 1))), "10.0.0.1");
        assert_eq!(display_option::<String>(&None), "-");
    }

    #[test]
    fn test_format_json() {
        assert_eq!(format_json(&serde_json::json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
