//! Model catalog command
//!
//! The backend does not expose a model discovery endpoint; the product
//! ships a fixed catalog of chat models. This module renders that catalog
//! and validates model names entered elsewhere in the CLI.

use colored::Colorize;
use prettytable::{format, Table};

/// One entry in the model catalog
#[derive(Debug, Clone, Copy)]
pub struct ModelEntry {
    /// Model identifier sent to the API
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
}

/// Chat models the service accepts
pub const MODELS: &[ModelEntry] = &[
    ModelEntry {
        id: "gpt-4o",
        name: "GPT-4o",
    },
    ModelEntry {
        id: "gpt-4-turbo",
        name: "GPT-4 Turbo",
    },
    ModelEntry {
        id: "o1",
        name: "o1",
    },
    ModelEntry {
        id: "o3-mini",
        name: "o3-mini",
    },
    ModelEntry {
        id: "claude-3-opus",
        name: "Claude 3 Opus",
    },
];

/// Returns true if `id` names a known model
pub fn is_known_model(id: &str) -> bool {
    MODELS.iter().any(|m| m.id == id)
}

/// Prints the model catalog
pub fn list_models(current: &str) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row!["ID".bold(), "Name".bold(), "".bold()]);
    for model in MODELS {
        let marker = if model.id == current { "active" } else { "" };
        table.add_row(prettytable::row![
            model.id.cyan(),
            model.name,
            marker.green()
        ]);
    }

    println!("\nAvailable models:");
    table.printstd();
    println!();
    println!(
        "Select one with {} or {} in a session.",
        "kintsugi chat --model <id>".cyan(),
        "/model <id>".cyan()
    );
    println!();
}
