use thiserror::Error;

/// Top-level error type for the `ptzlink-api` crate.
///
/// Covers the two failure families of the wire layer: transport (the
/// WebSocket itself) and protocol (envelopes that cannot be built or
/// parsed). `ptzlink-core` maps these into session-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket handshake or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Writing a frame to the socket failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Handshake did not complete within the configured window.
    #[error("Connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Addressing ──────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint URL cannot carry a channel/device path (e.g. `data:` URLs).
    #[error("Endpoint cannot carry a device path: {0}")]
    InvalidEndpoint(String),

    // ── Protocol ────────────────────────────────────────────────────
    /// Inbound frame failed structural validation.
    #[error("Malformed '{kind}' envelope: {message}")]
    Protocol { kind: String, message: String },

    /// Outbound envelope could not be serialized or failed validation.
    #[error("Cannot encode '{kind}' envelope: {message}")]
    Encode { kind: String, message: String },
}

impl Error {
    pub(crate) fn protocol(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transport failure worth reconnecting over.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::WebSocketSend(_)
                | Self::WebSocketClosed { .. }
                | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this error concerns a single envelope and leaves
    /// the connection itself intact.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Encode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(Error::Timeout { timeout_ms: 10 }.is_transient());
        assert!(
            Error::WebSocketClosed {
                code: 1006,
                reason: String::new()
            }
            .is_transient()
        );
        assert!(!Error::protocol("move", "bad").is_transient());
        assert!(!Error::InvalidEndpoint("data:x".into()).is_transient());
    }

    #[test]
    fn protocol_errors_are_not_fatal_to_the_connection() {
        assert!(Error::protocol("status_report", "missing success").is_protocol());
        assert!(
            Error::Encode {
                kind: "move".into(),
                message: "NaN".into()
            }
            .is_protocol()
        );
        assert!(!Error::WebSocketSend("broken pipe".into()).is_protocol());
    }
}
