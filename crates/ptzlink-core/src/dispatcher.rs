// ── Command dispatch ──
//
// Decides what goes on the wire and when. Continuous motion is coalesced
// per slot (pan/tilt, zoom) and released at most once per throttle
// interval; discrete commands are turned into messages immediately.
//
// Sans-IO: callers pass `now` in and drive `poll_due` from a timer.

use std::time::Duration;

use ptzlink_api::{
    Message, MovePayload, PatrolPayload, PresetPayload, StatusRequest, StopPayload, ZoomPayload,
};
use strum::{Display, EnumString};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::encoder::MotionIntent;

// ── Coalescer ────────────────────────────────────────────────────────

/// Latest-wins, trailing-edge rate limiter for a single value slot.
///
/// The first offer opens a window; when the window expires the newest
/// pending value is released and a fresh window starts. A window that
/// expires with nothing pending closes, so the next offer starts over.
#[derive(Debug)]
pub struct Coalescer<T> {
    interval: Duration,
    pending: Option<T>,
    window_end: Option<Instant>,
}

impl<T> Coalescer<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            window_end: None,
        }
    }

    /// Replace the pending value.
    pub fn offer(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        if self.window_end.is_none() {
            self.window_end = Some(now + self.interval);
        }
    }

    /// Release the pending value if its window has expired.
    pub fn poll_due(&mut self, now: Instant) -> Option<T> {
        match self.window_end {
            Some(end) if end <= now => {}
            _ => return None,
        }

        let value = self.pending.take();
        self.window_end = value.as_ref().map(|_| now + self.interval);
        value
    }

    /// When [`poll_due`](Self::poll_due) next has something to do.
    pub fn deadline(&self) -> Option<Instant> {
        self.window_end
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value and close the window.
    pub fn clear(&mut self) {
        self.pending = None;
        self.window_end = None;
    }
}

// ── Commands ─────────────────────────────────────────────────────────

/// Which axes a `stop` halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopScope {
    pub pan_tilt: bool,
    pub zoom: bool,
}

impl StopScope {
    pub const PAN_TILT: Self = Self {
        pan_tilt: true,
        zoom: false,
    };
    pub const ZOOM: Self = Self {
        pan_tilt: false,
        zoom: true,
    };
    pub const ALL: Self = Self {
        pan_tilt: true,
        zoom: true,
    };
}

/// Patrol control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PatrolAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Commands that bypass the throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscreteCommand {
    Preset { preset_id: String },
    Patrol {
        action: PatrolAction,
        pattern_id: Option<String>,
    },
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Per-session dispatch state.
#[derive(Debug)]
pub struct Dispatcher {
    device_id: String,
    move_timeout_ms: u64,
    moves: Coalescer<MotionIntent>,
    zooms: Coalescer<f64>,
}

impl Dispatcher {
    pub fn new(device_id: impl Into<String>, config: DispatchConfig) -> Self {
        Self {
            device_id: device_id.into(),
            move_timeout_ms: config.move_timeout_ms,
            moves: Coalescer::new(config.throttle_interval),
            zooms: Coalescer::new(config.throttle_interval),
        }
    }

    pub fn submit_motion(&mut self, intent: MotionIntent, now: Instant) {
        self.moves.offer(intent, now);
    }

    pub fn submit_zoom(&mut self, zoom_speed: f64, now: Instant) {
        self.zooms.offer(zoom_speed, now);
    }

    /// Build a `stop` and discard whatever is pending for the stopped axes,
    /// so no older motion can follow it onto the wire.
    pub fn stop(&mut self, scope: StopScope) -> Message {
        if scope.pan_tilt {
            self.moves.clear();
        }
        if scope.zoom {
            self.zooms.clear();
        }

        Message::Stop(StopPayload {
            device_id: self.device_id.clone(),
            stop_pan_tilt: scope.pan_tilt,
            stop_zoom: scope.zoom,
        })
    }

    pub fn discrete(&self, command: DiscreteCommand) -> Message {
        let device_id = self.device_id.clone();
        match command {
            DiscreteCommand::Preset { preset_id } => {
                Message::PresetApply(PresetPayload { device_id, preset_id })
            }
            DiscreteCommand::Patrol { action, pattern_id } => {
                let payload = PatrolPayload {
                    device_id,
                    pattern_id,
                };
                match action {
                    PatrolAction::Start => Message::PatrolStart(payload),
                    PatrolAction::Stop => Message::PatrolStop(payload),
                    PatrolAction::Pause => Message::PatrolPause(payload),
                    PatrolAction::Resume => Message::PatrolResume(payload),
                }
            }
        }
    }

    pub fn status_request(&self, request_id: Uuid) -> Message {
        Message::GetStatus(StatusRequest {
            device_id: self.device_id.clone(),
            request_id: Some(request_id),
        })
    }

    /// Messages whose throttle window has expired, pan/tilt first.
    pub fn poll_due(&mut self, now: Instant) -> Vec<Message> {
        let mut due = Vec::new();

        if let Some(intent) = self.moves.poll_due(now) {
            due.push(Message::Move(MovePayload {
                device_id: self.device_id.clone(),
                pan_speed: intent.pan,
                tilt_speed: intent.tilt,
                zoom_speed: intent.zoom,
                timeout_ms: self.move_timeout_ms,
            }));
        }
        if let Some(zoom_speed) = self.zooms.poll_due(now) {
            due.push(Message::Zoom(ZoomPayload {
                device_id: self.device_id.clone(),
                zoom_speed,
                timeout_ms: self.move_timeout_ms,
            }));
        }

        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.moves.deadline(), self.zooms.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Forget everything buffered. Used when the transport goes away.
    pub fn reset(&mut self) {
        self.moves.clear();
        self.zooms.clear();
    }

    pub fn has_pending(&self) -> bool {
        self.moves.has_pending() || self.zooms.has_pending()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
