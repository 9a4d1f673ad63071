//! One-shot motion, preset and patrol commands.
//!
//! Each handler opens a session, queues its commands, and closes the
//! session; close drains the queue before the channel goes down.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use ptzlink_core::{CommandEncoder, GestureInput, MotionIntent, PatrolAction, PtzClient, Session};

use crate::cli::{DeviceArgs, GlobalOpts, MoveArgs, PatrolArgs, PatrolVerb, PresetArgs, ZoomArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// Run `body` against a fresh session, closing it whatever the outcome.
async fn with_session<T>(
    client: &PtzClient,
    device: &str,
    global: &GlobalOpts,
    body: impl AsyncFnOnce(&Session) -> Result<T, CliError>,
) -> Result<T, CliError> {
    let session = util::connect(client, device, global).await?;
    let result = body(&session).await;
    session.close().await;
    result
}

/// Re-issue `tick` every `refresh` until `hold` has elapsed.
///
/// The device stops on its own once `timeout_ms` passes without a new
/// command, so long holds must keep the stream alive.
async fn hold_for(
    hold: Duration,
    refresh: Duration,
    mut tick: impl FnMut() -> Result<(), CliError>,
) -> Result<(), CliError> {
    let deadline = Instant::now() + hold;
    let mut ticker = tokio::time::interval_at(Instant::now() + refresh, refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => return Ok(()),
            _ = ticker.tick() => tick()?,
        }
    }
}

// ── move ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MoveOutcome {
    device_id: String,
    #[serde(flatten)]
    intent: MotionIntent,
    held_ms: u64,
}

pub async fn move_gesture(
    client: &PtzClient,
    args: MoveArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let refresh = client.config().dispatch.throttle_interval;
    // A hold shorter than one throttle window would never flush the move.
    let hold = args.hold.max(refresh);
    let gesture = GestureInput::new(args.x, args.y, args.magnitude);
    let encoder = CommandEncoder::new(client.config().encoder);

    let intent = with_session(client, &args.device, global, async |session: &Session| {
        let intent = session.move_gesture(gesture)?;
        // A neutral gesture was already sent as a release.
        if !encoder.is_neutral(&intent) {
            hold_for(hold, refresh, || {
                session.move_gesture(gesture)?;
                Ok(())
            })
            .await?;
        }
        session.release()?;
        Ok(intent)
    })
    .await?;

    let outcome = MoveOutcome {
        device_id: args.device,
        intent,
        held_ms: u64::try_from(hold.as_millis()).unwrap_or(u64::MAX),
    };
    let out = output::render_single(
        global.output,
        &outcome,
        |o| {
            format!(
                "{}  pan {:.2}  tilt {:.2}  held {}ms",
                o.device_id, o.intent.pan, o.intent.tilt, o.held_ms
            )
        },
        |o| format!("{} {}", o.intent.pan, o.intent.tilt),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── zoom ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ZoomOutcome {
    device_id: String,
    level: f64,
    zoom_speed: f64,
}

pub async fn zoom(client: &PtzClient, args: ZoomArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !(0.0..=100.0).contains(&args.level) {
        return Err(CliError::Validation {
            field: "level".into(),
            reason: format!("{} is outside [0, 100]", args.level),
        });
    }
    let refresh = client.config().dispatch.throttle_interval;
    let hold = args.hold.max(refresh);
    let level = args.level;

    let zoom_speed = with_session(client, &args.device, global, async |session: &Session| {
        let speed = session.zoom_to_level(level)?;
        hold_for(hold, refresh, || {
            session.zoom_to_level(level)?;
            Ok(())
        })
        .await?;
        session.release_zoom()?;
        Ok(speed)
    })
    .await?;

    let outcome = ZoomOutcome {
        device_id: args.device,
        level,
        zoom_speed,
    };
    let out = output::render_single(
        global.output,
        &outcome,
        |o| format!("{}  zoom speed {:.2}", o.device_id, o.zoom_speed),
        |o| o.zoom_speed.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── stop / preset / patrol ───────────────────────────────────────────

pub async fn stop(
    client: &PtzClient,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_session(client, &args.device, global, async |session: &Session| {
        Ok(session.stop()?)
    })
    .await?;
    util::notice(global, &format!("Stopped {}", args.device));
    Ok(())
}

pub async fn preset(
    client: &PtzClient,
    args: PresetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let preset_id = args.preset.clone();
    with_session(client, &args.device, global, async move |session: &Session| {
        Ok(session.apply_preset(preset_id)?)
    })
    .await?;
    util::notice(
        global,
        &format!("Preset '{}' applied on {}", args.preset, args.device),
    );
    Ok(())
}

pub fn patrol_action(verb: PatrolVerb) -> PatrolAction {
    match verb {
        PatrolVerb::Start => PatrolAction::Start,
        PatrolVerb::Stop => PatrolAction::Stop,
        PatrolVerb::Pause => PatrolAction::Pause,
        PatrolVerb::Resume => PatrolAction::Resume,
    }
}

pub async fn patrol(
    client: &PtzClient,
    args: PatrolArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let action = patrol_action(args.action);
    let pattern = match (action, args.pattern) {
        (PatrolAction::Start, pattern) => pattern,
        (_, Some(pattern)) => {
            tracing::warn!(%pattern, %action, "--pattern only applies to start; ignoring");
            None
        }
        (_, None) => None,
    };

    with_session(client, &args.device, global, async move |session: &Session| {
        Ok(session.patrol(action, pattern)?)
    })
    .await?;
    util::notice(global, &format!("Patrol {action} sent to {}", args.device));
    Ok(())
}
