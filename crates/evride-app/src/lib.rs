#![warn(missing_docs)]
//! # evride-app
//!
//! ## Purpose
//! Wires configuration, logging, the HTTP authority and the lifecycle
//! controller into the `evride-app` command line client.
//!
//! ## Responsibilities
//! - Load [`AppConfig`] from the environment (and an optional `.env` file).
//! - Install the `tracing` subscriber.
//! - Drive confirmations through [`ConfirmationDesk`].
//! - Quote preorders ([`PreorderQuote`]) and list the customer's rentals.
//! - Define the command line ([`Cli`]) with `clap`.
//! - Redact secrets from text before it is logged.
//!
//! ## Data flow
//! Environment -> [`AppConfig`] -> session + HTTP authority -> controller ->
//! desk review -> confirmed submit -> rendered view.
//!
//! ## Ownership and lifetimes
//! The binary owns one controller per command; the session and remote
//! authority are shared through `Arc`s.
//!
//! ## Error model
//! Failures are wrapped in [`AppError`]; the binary reports them through
//! `anyhow` and exits non-zero.
//!
//! ## Security and privacy notes
//! - The access token never appears in `Debug` output or logs.
//! - Remote error text passes through [`redact_sensitive`] before logging.

mod checkout;
mod cli;
mod config;
mod desk;

use chrono::{DateTime, Utc};
use evride_lifecycle::LifecycleError;
use evride_remote::RemoteError;
use evride_ui::{HistoryEntry, RentalHistory, RentalView};
use thiserror::Error;
use tracing::Level;

pub use checkout::{PreorderQuote, load_history};
pub use cli::{Cli, Command};
pub use config::AppConfig;
pub use desk::{ConfirmationDesk, DeskAction, DeskOutcome};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("EVRIDE_VERSION");

const REDACTED: &str = "<redacted>";

const SENSITIVE_KEYS: [&str; 6] = [
    "bearer",
    "token",
    "password",
    "authorization",
    "securehash",
    "secret",
];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs the global `fmt` subscriber at `level`.
///
/// # Errors
/// Returns [`AppError::Logging`] when a subscriber is already installed.
pub fn init_tracing(level: Level) -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|error| AppError::Logging(error.to_string()))
}

/// Replaces the values that follow common secret markers with `<redacted>`.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in SENSITIVE_KEYS {
        redacted = redact_values_after(&redacted, key);
    }
    redacted
}

fn redact_values_after(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(key) {
        let key_end = cursor + found + key.len();
        let value_start = key_end
            + lower[key_end..]
                .bytes()
                .take_while(|byte| matches!(byte, b'=' | b':' | b' ' | b'"' | b'\''))
                .count();
        let value_len = lower[value_start..]
            .bytes()
            .take_while(|byte| !ends_value(*byte))
            .count();

        output.push_str(&input[cursor..value_start]);
        if value_len > 0 {
            output.push_str(REDACTED);
        }
        cursor = value_start + value_len;
    }

    output.push_str(&input[cursor..]);
    output
}

fn ends_value(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'&' | b',' | b';' | b'"' | b'\'' | b'}')
}

/// Renders a rental view as printable lines.
pub fn render_view(view: &RentalView) -> Vec<String> {
    let mut lines = vec![
        format!("Rental #{} [{}]", view.rental_id, view.badge),
        view.description.to_string(),
        format!("Vehicle: {}", view.vehicle),
        format!("Package: {}", view.package),
        format!("Total: {}", view.total_cost),
    ];

    if let (Some(elapsed), Some(countdown)) = (&view.elapsed, &view.countdown) {
        lines.push(format!(
            "Used {elapsed}, {countdown} left ({:.0}%)",
            view.percent_complete
        ));
    }
    if let Some(end) = view.expected_end {
        lines.push(format!("Expected end: {}", end.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(alert) = view.alert {
        lines.push(alert.message().to_string());
    }
    let prompt = view.next_action.prompt();
    if !prompt.is_empty() {
        lines.push(format!("Next: {prompt}"));
    }
    lines
}

/// Renders the customer's rentals as printable lines.
pub fn render_history(history: &RentalHistory) -> Vec<String> {
    if history.is_empty() {
        return vec!["No rentals yet.".to_string()];
    }

    let mut lines = Vec::new();
    for (title, entries) in [("Ongoing", &history.ongoing), ("Past", &history.past)] {
        if entries.is_empty() {
            continue;
        }
        lines.push(format!("{title}:"));
        lines.extend(entries.iter().map(history_line));
    }
    lines
}

fn history_line(entry: &HistoryEntry) -> String {
    let when = |instant: Option<DateTime<Utc>>| {
        instant
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "  #{} {} [{}] {}, {}, from {} | {} -> {}",
        entry.rental_id,
        entry.vehicle,
        entry.badge,
        entry.package,
        entry.total_cost,
        entry.station.as_deref().unwrap_or("N/A"),
        when(entry.started),
        when(entry.ended)
    )
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
    /// Preorder could not be quoted.
    #[error("checkout error: {0}")]
    Checkout(String),
    /// Logging could not be initialized.
    #[error("logging error: {0}")]
    Logging(String),
    /// Remote authority setup or call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    /// Lifecycle transition failed.
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
}
