// ── Runtime client configuration ──
//
// Describes *how* to reach the control endpoint and how to pace commands.
// Carries the credential but never touches disk: the CLI builds a
// `ClientConfig` from its profile and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

pub use ptzlink_api::ReconnectConfig as ReconnectPolicy;

/// Opaque bearer token plus the logical user identity sent in `connect`.
///
/// Shared read-only by every session of a client.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: String,
    pub token: SecretString,
}

impl Credential {
    pub fn new(user_id: impl Into<String>, token: SecretString) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }

    /// A credential without a token cannot open a session.
    pub fn is_empty(&self) -> bool {
        self.token.expose_secret().trim().is_empty()
    }
}

/// Gesture-to-speed mapping constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    /// Multiplier applied to `vector * magnitude`. Default: 0.5.
    pub gain: f64,
    /// Pan/tilt speed meaning "no motion". Default: 0.5.
    pub neutral: f64,
    /// Pan/tilt speeds are clamped to `neutral ± half_range`. Default: 0.5.
    pub half_range: f64,
    /// Zoom speed at level 0. Default: -1.0.
    pub zoom_min: f64,
    /// Zoom speed at level 100. Default: 1.0.
    pub zoom_max: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            gain: 0.5,
            neutral: 0.5,
            half_range: 0.5,
            zoom_min: -1.0,
            zoom_max: 1.0,
        }
    }
}

/// Motion throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Minimum spacing between continuous `move`/`zoom` envelopes.
    pub throttle_interval: Duration,
    /// `timeout_ms` carried by each `move`/`zoom`: how long the device keeps
    /// moving without a follow-up.
    pub move_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(120),
            move_timeout_ms: 1000,
        }
    }
}

/// Configuration for a [`PtzClient`](crate::PtzClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control endpoint, e.g. `wss://cams.example.com/api`.
    pub endpoint: Url,
    /// Path segment selecting the PTZ channel. Default: `ptz`.
    pub channel: String,
    pub credential: Credential,
    pub reconnect: ReconnectPolicy,
    /// Bound on each WebSocket handshake.
    pub connect_timeout: Duration,
    /// Wait for `connect_ack` before entering `Active`.
    pub require_connect_ack: bool,
    pub dispatch: DispatchConfig,
    /// How long a `get_status` may stay unanswered.
    pub status_timeout: Duration,
    pub encoder: EncoderConfig,
}

impl ClientConfig {
    /// Build a config with default tuning for `endpoint`.
    pub fn new(endpoint: Url, credential: Credential) -> Self {
        Self {
            endpoint,
            channel: "ptz".into(),
            credential,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            require_connect_ack: false,
            dispatch: DispatchConfig::default(),
            status_timeout: Duration::from_secs(3),
            encoder: EncoderConfig::default(),
        }
    }
}
