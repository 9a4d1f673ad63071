// ── Envelope payloads ──
//
// One struct per envelope kind. Field names are the wire names; optional
// fields are omitted on encode and defaulted on decode so that every
// payload survives an encode/decode cycle unchanged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `connect`: opens the logical session with the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub device_id: String,
    pub user_id: String,
}

/// `move`: continuous pan/tilt/zoom at the given speeds.
///
/// `timeout_ms` bounds how long the device keeps moving without a
/// follow-up command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub device_id: String,
    pub pan_speed: f64,
    pub tilt_speed: f64,
    pub zoom_speed: f64,
    pub timeout_ms: u64,
}

/// `stop`: halts pan/tilt, zoom, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopPayload {
    pub device_id: String,
    pub stop_pan_tilt: bool,
    pub stop_zoom: bool,
}

/// `zoom`: continuous zoom only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomPayload {
    pub device_id: String,
    pub zoom_speed: f64,
    pub timeout_ms: u64,
}

/// `get_status`: asks the device for its current position.
///
/// `request_id` is echoed back in the matching `status_report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

/// `patrol_start` / `patrol_stop` / `patrol_pause` / `patrol_resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolPayload {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

/// `preset_apply`: move to a stored preset position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetPayload {
    pub device_id: String,
    pub preset_id: String,
}

/// Single-axis value as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValue {
    pub x: f64,
}

/// Position and/or speed of one axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AxisValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<AxisValue>,
}

impl AxisReading {
    pub fn position(&self) -> Option<f64> {
        self.position.map(|v| v.x)
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed.map(|v| v.x)
    }
}

/// `status_report` (inbound): device-originated position/speed snapshot.
///
/// `request_id` is present when the report acknowledges a specific
/// `get_status`; unsolicited pushes leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub device_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<AxisReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt: Option<AxisReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<AxisReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl StatusReport {
    /// Whether this report answers a specific `get_status`.
    pub fn is_acknowledgment(&self) -> bool {
        self.request_id.is_some()
    }

    /// The device's error string when it rejected the command.
    pub fn rejection(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("device reported failure"))
        }
    }
}

/// `connect_ack` (inbound): endpoint acknowledgment of `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAck {
    pub device_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
