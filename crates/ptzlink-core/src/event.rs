// ── Session state and events ──
//
// Everything a UI layer can observe about a session without holding a
// reference into the driver task.

use std::sync::Arc;

use ptzlink_api::StatusReport;
use serde::Serialize;
use strum::Display;

use crate::error::CoreError;

/// Lifecycle of one device session.
///
/// ```text
/// Idle → Connecting → Authenticated → Active → Closing → Closed
///            ↓   ↑                      ↓
///           Faulted ←────────────────────
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Handshake attempt `attempt` (1-based) of the current connect sequence.
    Connecting { attempt: u32 },
    /// Transport is up and `connect` has been sent.
    Authenticated,
    Active,
    /// Attempt `attempt` failed; `0` means an established channel was lost.
    Faulted { attempt: u32 },
    Closing,
    Closed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// No further transitions will happen.
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

/// Notifications broadcast by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Any inbound status report, solicited or not.
    Status(Arc<StatusReport>),
    /// An inbound frame was discarded.
    ProtocolError { message: String },
    /// The session ended on its own; carries the fatal error.
    Terminated { error: CoreError },
}
