// ── Core error types ──
//
// User-facing errors from ptzlink-core. Callers never see raw WebSocket or
// JSON failures: the `From<ptzlink_api::Error>` impl translates wire-level
// errors into session-level variants.

use thiserror::Error;

use crate::event::SessionState;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Fatal session errors ─────────────────────────────────────────
    #[error("No credential available: a bearer token is required to open a session")]
    NoCredential,

    #[error("Gave up after {attempts} connection attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    #[error("Endpoint rejected the session: {reason}")]
    ConnectRejected { reason: String },

    // ── Dispatch errors ──────────────────────────────────────────────
    #[error("Session is not active (state: {state})")]
    NotConnected { state: SessionState },

    #[error("Device {device_id} is already controlled by another session")]
    DeviceBusy { device_id: String },

    // ── Status errors ────────────────────────────────────────────────
    #[error("No status report within {timeout_ms}ms")]
    StatusTimeout { timeout_ms: u64 },

    #[error("Request canceled: session closed")]
    Canceled,

    // ── Input / configuration ────────────────────────────────────────
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Wrapped lower-level failures ─────────────────────────────────
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Fatal errors end the session and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoCredential | Self::ReconnectExhausted { .. } | Self::ConnectRejected { .. }
        )
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<ptzlink_api::Error> for CoreError {
    fn from(err: ptzlink_api::Error) -> Self {
        use ptzlink_api::Error as Api;

        match err {
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid endpoint URL: {e}"),
            },
            Api::InvalidEndpoint(message) => CoreError::Config { message },
            Api::Encode { kind, message } => CoreError::InvalidInput {
                message: format!("{kind}: {message}"),
            },
            Api::Protocol { kind, message } => {
                CoreError::Internal(format!("Malformed '{kind}' envelope: {message}"))
            }
            other @ (Api::WebSocketConnect(_)
            | Api::WebSocketSend(_)
            | Api::WebSocketClosed { .. }
            | Api::Timeout { .. }) => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CoreError::NoCredential.is_fatal());
        assert!(
            CoreError::ReconnectExhausted {
                attempts: 3,
                last_error: "refused".into()
            }
            .is_fatal()
        );
        assert!(
            !CoreError::NotConnected {
                state: SessionState::Idle
            }
            .is_fatal()
        );
        assert!(!CoreError::StatusTimeout { timeout_ms: 3000 }.is_fatal());
    }

    #[test]
    fn wire_errors_are_translated() {
        let err: CoreError = ptzlink_api::Error::Timeout { timeout_ms: 10 }.into();
        assert!(matches!(err, CoreError::Transport { .. }));

        let err: CoreError = ptzlink_api::Error::Encode {
            kind: "preset_apply".into(),
            message: "preset_id must not be empty".into(),
        }
        .into();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[test]
    fn not_connected_names_the_state() {
        let err = CoreError::NotConnected {
            state: SessionState::Faulted { attempt: 2 },
        };
        assert_eq!(err.to_string(), "Session is not active (state: faulted)");
    }
}
