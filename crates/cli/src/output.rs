//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use scaler_lib::resources::RolloverPhase;
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

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(items).with(Style::rounded()));
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a cost in the catalog's canonical units
pub fn format_cost(cost: f64) -> String {
    if (cost - cost.round()).abs() < 1e-9 {
        format!("{}", cost.round() as u64)
    } else {
        format!("{:.2}", cost)
    }
}

/// Color a rollover phase
pub fn color_phase(phase: RolloverPhase) -> String {
    let label = phase.as_str();
    match phase {
        RolloverPhase::Done => label.green().to_string(),
        RolloverPhase::AwaitingReady | RolloverPhase::Draining => label.yellow().to_string(),
        RolloverPhase::Failed => label.red().to_string(),
        RolloverPhase::Idle => label.dimmed().to_string(),
    }
}
