//! `ptzlink joystick <device>`: a line-driven control console.
//!
//! Reads one command per line from stdin so it can be driven by a person,
//! a script, or a pipe from a real input device:
//!
//! ```text
//! 0.5 -0.2 0.8      deflect to (x, y) with magnitude 0.8
//! release           end the gesture (stop pan/tilt)
//! zoom 75           zoom in; `zoom release` stops zooming
//! preset home       apply a preset
//! patrol start p1   patrol start|stop|pause|resume [pattern]
//! stop              stop every axis
//! status            print the device's position
//! quit
//! ```

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use ptzlink_core::{GestureInput, PatrolAction, PtzClient, Session, SessionEvent};

use crate::cli::{DeviceArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Line grammar ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum JoystickInput {
    Move(GestureInput),
    Release,
    Zoom(f64),
    ReleaseZoom,
    Stop,
    Preset(String),
    Patrol {
        action: PatrolAction,
        pattern_id: Option<String>,
    },
    Status,
    Help,
    Quit,
    /// Blank line or `#` comment.
    Nothing,
}

fn number(word: &str, what: &str) -> Result<f64, String> {
    word.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("{what} must be a number, got '{word}'"))
}

/// Parse one console line.
pub fn parse_joystick_line(line: &str) -> Result<JoystickInput, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = words.split_first() else {
        return Ok(JoystickInput::Nothing);
    };
    if head.starts_with('#') {
        return Ok(JoystickInput::Nothing);
    }

    match (head.to_ascii_lowercase().as_str(), rest) {
        ("quit" | "exit" | "q", []) => Ok(JoystickInput::Quit),
        ("release" | "r", []) => Ok(JoystickInput::Release),
        ("stop" | "s", []) => Ok(JoystickInput::Stop),
        ("status", []) => Ok(JoystickInput::Status),
        ("help" | "?", []) => Ok(JoystickInput::Help),
        ("zoom" | "z", ["release" | "stop"]) => Ok(JoystickInput::ReleaseZoom),
        ("zoom" | "z", [level]) => {
            let level = number(level, "zoom level")?;
            if (0.0..=100.0).contains(&level) {
                Ok(JoystickInput::Zoom(level))
            } else {
                Err(format!("zoom level {level} is outside [0, 100]"))
            }
        }
        ("preset" | "p", [preset_id]) => Ok(JoystickInput::Preset((*preset_id).to_owned())),
        ("patrol", [action, pattern @ ..]) if pattern.len() <= 1 => {
            let action = action
                .parse::<PatrolAction>()
                .map_err(|_| format!("unknown patrol action '{action}'"))?;
            Ok(JoystickInput::Patrol {
                action,
                pattern_id: pattern.first().map(|p| (*p).to_owned()),
            })
        }
        (_, [] | [_] | [_, _]) if head.parse::<f64>().is_ok() => {
            let x = number(head, "x")?;
            let y = rest
                .first()
                .ok_or_else(|| "expected `x y [magnitude]`".to_owned())
                .and_then(|w| number(w, "y"))?;
            let magnitude = rest.get(1).map_or(Ok(1.0), |w| number(w, "magnitude"))?;
            Ok(JoystickInput::Move(GestureInput::new(x, y, magnitude)))
        }
        _ => Err(format!("unrecognized command '{}' (try `help`)", line.trim())),
    }
}

const HELP: &str = "\
x y [magnitude]          deflect the stick (each in [-1, 1], magnitude in [0, 1])
release | r              end the gesture
zoom <0-100> | zoom release
preset <id>
patrol <start|stop|pause|resume> [pattern]
stop | s                 stop every axis
status                   query position
quit | q";

// ── Console loop ─────────────────────────────────────────────────────

pub async fn handle(
    client: &PtzClient,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = util::connect(client, &args.device, global).await?;
    let mut events = session.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let color = output::should_color(global.color);

    if !global.quiet {
        eprintln!("Controlling {}. Type `help` for commands.", args.device);
    }

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        outcome = Err(e.into());
                        break;
                    }
                };
                match parse_joystick_line(&line) {
                    Ok(JoystickInput::Quit) => break,
                    Ok(input) => {
                        // The console survives reconnects: report and keep reading.
                        if let Err(e) = apply(&session, input).await {
                            eprintln!("! {e}");
                        }
                    }
                    Err(message) => eprintln!("? {message}"),
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged { to, .. }) if !global.quiet => {
                    eprintln!("[{}]", output::paint_state(to, color));
                }
                Ok(SessionEvent::Terminated { error }) => {
                    outcome = Err(error.into());
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Leave the camera still.
    if session.state().is_active() {
        let _ = session.stop();
    }
    session.close().await;
    outcome
}

async fn apply(session: &Session, input: JoystickInput) -> Result<(), CliError> {
    match input {
        JoystickInput::Move(gesture) => {
            session.move_gesture(gesture)?;
        }
        JoystickInput::Release => session.release()?,
        JoystickInput::Zoom(level) => {
            session.zoom_to_level(level)?;
        }
        JoystickInput::ReleaseZoom => session.release_zoom()?,
        JoystickInput::Stop => session.stop()?,
        JoystickInput::Preset(preset_id) => session.apply_preset(preset_id)?,
        JoystickInput::Patrol { action, pattern_id } => session.patrol(action, pattern_id)?,
        JoystickInput::Status => {
            let report = session.get_status().await?;
            println!("{}", output::status_plain(&report));
            if let Some(reason) = report.rejection() {
                eprintln!("! device rejected: {reason}");
            }
        }
        JoystickInput::Help => println!("{HELP}"),
        JoystickInput::Quit | JoystickInput::Nothing => {}
    }
    Ok(())
}
