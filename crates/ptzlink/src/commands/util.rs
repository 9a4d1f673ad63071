//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use ptzlink_core::{PtzClient, Session};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Open a session for `device` and wait until it is active.
pub async fn connect(
    client: &PtzClient,
    device: &str,
    global: &GlobalOpts,
) -> Result<Session, CliError> {
    let spinner = spinner(global, format!("Connecting to {device}"));
    let result = client.acquire(device).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    Ok(result?)
}

/// Stderr spinner, only when a human is watching.
fn spinner(global: &GlobalOpts, message: String) -> Option<ProgressBar> {
    if global.quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

/// Confirmation line on stderr, suppressed by `--quiet`.
pub fn notice(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("✓ {message}");
    }
}
