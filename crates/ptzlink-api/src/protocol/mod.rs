//! Envelope codec for the PTZ control channel.
//!
//! Every frame on the channel is one self-contained JSON text envelope:
//!
//! ```json
//! { "kind": "move", "payload": { "device_id": "cam-1", ... }, "timestamp": 1700000000000 }
//! ```
//!
//! The payload shape is fully determined by `kind`; [`Message`] makes that
//! a type-level guarantee. Decoding is forward compatible: envelopes with
//! an unknown `kind` are logged and skipped (`Ok(None)`), while envelopes
//! of a known kind whose payload is malformed surface as
//! [`Error::Protocol`] so the caller can discard that single frame.

pub mod types;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Error;
use types::{
    ConnectAck, ConnectPayload, MovePayload, PatrolPayload, PresetPayload, StatusReport,
    StatusRequest, StopPayload, ZoomPayload,
};

// ── EnvelopeKind ─────────────────────────────────────────────────────

/// The `kind` discriminator of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EnvelopeKind {
    Connect,
    Move,
    Stop,
    Zoom,
    GetStatus,
    PatrolStart,
    PatrolStop,
    PatrolPause,
    PatrolResume,
    PresetApply,
    StatusReport,
    ConnectAck,
}

impl EnvelopeKind {
    /// Kinds that only ever travel device → client.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::StatusReport | Self::ConnectAck)
    }

    /// Kinds that change the physical motion state of the device.
    pub fn is_motion(self) -> bool {
        matches!(self, Self::Move | Self::Zoom | Self::Stop)
    }
}

// ── Message ──────────────────────────────────────────────────────────

/// A typed envelope body: the `kind` tag plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Message {
    Connect(ConnectPayload),
    Move(MovePayload),
    Stop(StopPayload),
    Zoom(ZoomPayload),
    GetStatus(StatusRequest),
    PatrolStart(PatrolPayload),
    PatrolStop(PatrolPayload),
    PatrolPause(PatrolPayload),
    PatrolResume(PatrolPayload),
    PresetApply(PresetPayload),
    StatusReport(StatusReport),
    ConnectAck(ConnectAck),
}

impl Message {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Connect(_) => EnvelopeKind::Connect,
            Self::Move(_) => EnvelopeKind::Move,
            Self::Stop(_) => EnvelopeKind::Stop,
            Self::Zoom(_) => EnvelopeKind::Zoom,
            Self::GetStatus(_) => EnvelopeKind::GetStatus,
            Self::PatrolStart(_) => EnvelopeKind::PatrolStart,
            Self::PatrolStop(_) => EnvelopeKind::PatrolStop,
            Self::PatrolPause(_) => EnvelopeKind::PatrolPause,
            Self::PatrolResume(_) => EnvelopeKind::PatrolResume,
            Self::PresetApply(_) => EnvelopeKind::PresetApply,
            Self::StatusReport(_) => EnvelopeKind::StatusReport,
            Self::ConnectAck(_) => EnvelopeKind::ConnectAck,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::Connect(p) => &p.device_id,
            Self::Move(p) => &p.device_id,
            Self::Stop(p) => &p.device_id,
            Self::Zoom(p) => &p.device_id,
            Self::GetStatus(p) => &p.device_id,
            Self::PatrolStart(p)
            | Self::PatrolStop(p)
            | Self::PatrolPause(p)
            | Self::PatrolResume(p) => &p.device_id,
            Self::PresetApply(p) => &p.device_id,
            Self::StatusReport(p) => &p.device_id,
            Self::ConnectAck(p) => &p.device_id,
        }
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id().is_empty() {
            return Err("device_id must not be empty".into());
        }

        match self {
            Self::Connect(p) if p.user_id.is_empty() => Err("user_id must not be empty".into()),
            Self::Move(p) => {
                finite("pan_speed", p.pan_speed)?;
                finite("tilt_speed", p.tilt_speed)?;
                finite("zoom_speed", p.zoom_speed)
            }
            Self::Zoom(p) => finite("zoom_speed", p.zoom_speed),
            Self::PresetApply(p) if p.preset_id.is_empty() => {
                Err("preset_id must not be empty".into())
            }
            Self::StatusReport(p) => {
                for (axis, reading) in [("pan", &p.pan), ("tilt", &p.tilt), ("zoom", &p.zoom)] {
                    let Some(reading) = reading else { continue };
                    if let Some(v) = reading.position() {
                        finite(axis, v)?;
                    }
                    if let Some(v) = reading.speed() {
                        finite(axis, v)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn finite(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{field} must be a finite number"))
    }
}

// ── Envelope ─────────────────────────────────────────────────────────

/// A message plus its client-assigned send timestamp (ms since epoch).
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: Message,
    pub timestamp: i64,
}

impl Envelope {
    /// Wrap a message, stamping it with the current wall-clock time.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_timestamp(message: Message, timestamp: i64) -> Self {
        Self { message, timestamp }
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.message.kind()
    }

    /// Serialize to a single text frame.
    pub fn encode(&self) -> Result<String, Error> {
        let kind = self.kind();
        let encode_err = |message: String| Error::Encode {
            kind: kind.to_string(),
            message,
        };

        self.message.validate().map_err(encode_err)?;

        let mut value = serde_json::to_value(&self.message).map_err(|e| encode_err(e.to_string()))?;
        let Value::Object(ref mut map) = value else {
            return Err(encode_err("message did not serialize to an object".into()));
        };
        map.insert("timestamp".into(), Value::from(self.timestamp));

        serde_json::to_string(&value).map_err(|e| encode_err(e.to_string()))
    }

    /// Parse a text frame.
    ///
    /// Returns `Ok(None)` for well-formed envelopes whose `kind` this
    /// client does not know.
    pub fn decode(text: &str) -> Result<Option<Self>, Error> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::protocol("<unparsed>", e.to_string()))?;

        let Value::Object(mut map) = value else {
            return Err(Error::protocol("<unparsed>", "envelope is not a JSON object"));
        };

        let Some(kind_str) = map.get("kind").and_then(Value::as_str).map(str::to_owned) else {
            return Err(Error::protocol("<unparsed>", "missing string field `kind`"));
        };

        if kind_str.parse::<EnvelopeKind>().is_err() {
            tracing::debug!(kind = %kind_str, "ignoring envelope of unknown kind");
            return Ok(None);
        }

        let timestamp = map
            .remove("timestamp")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::protocol(&kind_str, "missing or non-integer `timestamp`"))?;

        if !map.contains_key("payload") {
            return Err(Error::protocol(&kind_str, "missing `payload`"));
        }

        let message: Message = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::protocol(&kind_str, e.to_string()))?;
        message
            .validate()
            .map_err(|reason| Error::protocol(&kind_str, reason))?;

        Ok(Some(Self { message, timestamp }))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
