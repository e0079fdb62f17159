//! Console output helpers
//!
//! Status lines go to stdout, errors to stderr. Logging goes through
//! `tracing`; these are for people reading the terminal.

use std::fmt::Display;

use console::{style, Style};

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Bold section title
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Indented `key: value` line with a dimmed key
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

fn version_style() -> Style {
    Style::new().green().bold()
}

/// A version, or a dimmed `none` when there is none
pub fn maybe_version(version: Option<impl Display>) -> String {
    match version {
        Some(v) => version_style().apply_to(v).to_string(),
        None => style("none").dim().to_string(),
    }
}

/// `name: last -> next` line for a planned release
pub fn transition(name: &str, last: Option<impl Display>, next: impl Display) -> String {
    key_value(
        name,
        &format!("{} -> {}", maybe_version(last), version_style().apply_to(next)),
    )
}

/// Branch names are shown in yellow
pub fn branch(name: &str) -> String {
    style(name).yellow().to_string()
}
