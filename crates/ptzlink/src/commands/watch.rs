//! `ptzlink watch <device>`: stream session events until interrupted.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use ptzlink_core::{PtzClient, SessionEvent, SessionState, StatusReport};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

// ── Event records ────────────────────────────────────────────────────

/// Serializable view of one [`SessionEvent`].
#[derive(Debug, Serialize)]
struct WatchRecord<'a> {
    at: DateTime<Utc>,
    device_id: &'a str,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Arc<StatusReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<'a> WatchRecord<'a> {
    fn new(device_id: &'a str, event: &SessionEvent) -> Self {
        let mut record = Self {
            at: Utc::now(),
            device_id,
            event: "state",
            from: None,
            to: None,
            status: None,
            message: None,
        };
        match event {
            SessionEvent::StateChanged { from, to } => {
                record.from = Some(*from);
                record.to = Some(*to);
            }
            SessionEvent::Status(report) => {
                record.event = "status";
                record.status = Some(Arc::clone(report));
            }
            SessionEvent::ProtocolError { message } => {
                record.event = "protocol_error";
                record.message = Some(message.clone());
            }
            SessionEvent::Terminated { error } => {
                record.event = "terminated";
                record.message = Some(error.to_string());
            }
        }
        record
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn print(&self, device_id: &str, event: &SessionEvent) {
        let record = WatchRecord::new(device_id, event);
        let line = match self.format {
            // One document per event so the stream stays line-parseable.
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_single(
                OutputFormat::JsonCompact,
                &record,
                |_| String::new(),
                |_| String::new(),
            ),
            OutputFormat::Yaml => {
                let doc = output::render_single(
                    OutputFormat::Yaml,
                    &record,
                    |_| String::new(),
                    |_| String::new(),
                );
                format!("---\n{}", doc.trim_end())
            }
            OutputFormat::Table | OutputFormat::Plain => self.human(&record),
        };
        output::print_output(&line, self.quiet);
    }

    fn human(&self, record: &WatchRecord<'_>) -> String {
        let at = record.at.with_timezone(&Local).format("%H:%M:%S%.3f");
        let detail = match (record.from, record.to, &record.status) {
            (Some(from), Some(to), _) => format!(
                "{} -> {}",
                output::paint_state(from, self.color),
                output::paint_state(to, self.color)
            ),
            (_, _, Some(report)) => output::status_plain(report).replace('\n', "  "),
            _ => format!(
                "{}: {}",
                record.event,
                record.message.as_deref().unwrap_or_default()
            ),
        };
        format!("{at}  {}  {detail}", record.device_id)
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    client: &PtzClient,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let printer = Printer {
        format: global.output,
        color: output::should_color(global.color),
        quiet: global.quiet,
    };
    let device = args.device.as_str();

    // Subscribe before the first attempt so every transition is shown.
    let pending = client.open(device)?;
    let mut events = pending.events();
    let wait = pending.wait();
    tokio::pin!(wait);
    let session = loop {
        tokio::select! {
            result = &mut wait => break result?,
            event = events.recv() => match event {
                Ok(event) => printer.print(device, &event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break (&mut wait).await?,
            },
        }
    };

    let status = async {
        if args.status {
            if let Err(e) = session.get_status().await {
                tracing::warn!(error = %e, "initial status request failed");
            }
        }
    };
    tokio::pin!(status);
    let mut status_done = false;

    let deadline = args.duration.map(|d| Instant::now() + d);
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut expired => break,
            () = &mut status, if !status_done => status_done = true,
            event = events.recv() => match event {
                Ok(SessionEvent::Terminated { error }) => {
                    printer.print(device, &SessionEvent::Terminated { error: error.clone() });
                    outcome = Err(error.into());
                    break;
                }
                Ok(event) => {
                    printer.print(device, &event);
                    if matches!(
                        event,
                        SessionEvent::StateChanged {
                            to: SessionState::Closed,
                            ..
                        }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.close().await;
    outcome
}
