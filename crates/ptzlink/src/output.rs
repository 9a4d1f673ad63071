//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one value per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use ptzlink_core::{AxisReading, SessionState, StatusReport};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Session state, colored by health.
pub fn paint_state(state: SessionState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        SessionState::Active => label.green().to_string(),
        SessionState::Faulted { .. } => label.red().to_string(),
        SessionState::Connecting { .. } | SessionState::Authenticated => label.yellow().to_string(),
        _ => label.dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views don't use
/// the `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Status report view ───────────────────────────────────────────────

#[derive(Tabled)]
struct AxisRow {
    #[tabled(rename = "Axis")]
    axis: &'static str,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "Speed")]
    speed: String,
}

fn axis_row(axis: &'static str, reading: Option<&AxisReading>) -> AxisRow {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_owned(), |v| format!("{v:.2}"));
    AxisRow {
        axis,
        position: fmt(reading.and_then(AxisReading::position)),
        speed: fmt(reading.and_then(AxisReading::speed)),
    }
}

fn axis_rows(report: &StatusReport) -> [AxisRow; 3] {
    [
        axis_row("pan", report.pan.as_ref()),
        axis_row("tilt", report.tilt.as_ref()),
        axis_row("zoom", report.zoom.as_ref()),
    ]
}

/// Table view of a status report: header line plus one row per axis.
pub fn status_detail(report: &StatusReport, color: bool) -> String {
    let verdict = match report.rejection() {
        None if color => "ok".green().to_string(),
        None => "ok".to_owned(),
        Some(reason) if color => format!("{} ({reason})", "rejected".red()),
        Some(reason) => format!("rejected ({reason})"),
    };
    format!(
        "{}  {verdict}\n{}",
        report.device_id,
        render_table(&axis_rows(report))
    )
}

/// One `axis position speed` line per axis.
pub fn status_plain(report: &StatusReport) -> String {
    axis_rows(report)
        .iter()
        .map(|row| format!("{} {} {}", row.axis, row.position, row.speed))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}
