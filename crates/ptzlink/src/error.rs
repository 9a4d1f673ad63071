//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ptzlink_config::ConfigError;
use ptzlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const REJECTED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not open a control channel: {reason}")]
    #[diagnostic(
        code(ptzlink::connection_failed),
        help(
            "Check that the endpoint is reachable and the URL is correct.\n\
             Try: ptzlink -vv status <device>"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Session is not active (state: {state})")]
    #[diagnostic(
        code(ptzlink::not_connected),
        help("The control channel dropped; the command was not sent.")
    )]
    NotConnected { state: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Endpoint rejected the session: {reason}")]
    #[diagnostic(
        code(ptzlink::connect_rejected),
        help(
            "Verify the bearer token and user id.\n\
             Run: ptzlink config set-token"
        )
    )]
    ConnectRejected { reason: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(ptzlink::no_credentials),
        help(
            "Configure a token with: ptzlink config init\n\
             Or set PTZLINK_TOKEN, or pass --token."
        )
    )]
    NoCredentials { profile: String },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device '{device_id}' is already being controlled")]
    #[diagnostic(code(ptzlink::device_busy))]
    DeviceBusy { device_id: String },

    #[error("Device '{device_id}' rejected the request: {reason}")]
    #[diagnostic(code(ptzlink::device_rejected))]
    DeviceRejected { device_id: String, reason: String },

    // ── Timeout / cancellation ───────────────────────────────────────
    #[error("No response within {millis}ms")]
    #[diagnostic(
        code(ptzlink::timeout),
        help("Raise status_timeout_ms in the profile or check the device.")
    )]
    Timeout { millis: u64 },

    #[error("Operation canceled")]
    #[diagnostic(code(ptzlink::canceled))]
    Canceled,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ptzlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ptzlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: ptzlink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No endpoint configured")]
    #[diagnostic(
        code(ptzlink::no_config),
        help(
            "Create a profile with: ptzlink config init\n\
             Expected at: {path}\n\
             Or pass --endpoint and --token."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ptzlink::config))]
    Config(Box<ConfigError>),

    #[error("Internal error: {0}")]
    #[diagnostic(code(ptzlink::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NotConnected { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ConnectRejected { .. } | Self::DeviceRejected { .. } => exit_code::REJECTED,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::DeviceBusy { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoCredential => CliError::NoCredentials {
                profile: "current".into(),
            },
            err @ (CoreError::ReconnectExhausted { .. } | CoreError::Transport { .. }) => {
                CliError::ConnectionFailed {
                    reason: err.to_string(),
                }
            }
            CoreError::ConnectRejected { reason } => CliError::ConnectRejected { reason },
            CoreError::NotConnected { state } => CliError::NotConnected {
                state: state.to_string(),
            },
            CoreError::DeviceBusy { device_id } => CliError::DeviceBusy { device_id },
            CoreError::StatusTimeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            CoreError::Canceled => CliError::Canceled,
            CoreError::InvalidInput { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptzlink_core::SessionState;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::NoCredential, exit_code::AUTH),
            (
                CoreError::ReconnectExhausted {
                    attempts: 3,
                    last_error: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::ConnectRejected {
                    reason: "bad token".into(),
                },
                exit_code::REJECTED,
            ),
            (
                CoreError::NotConnected {
                    state: SessionState::Faulted { attempt: 0 },
                },
                exit_code::CONNECTION,
            ),
            (CoreError::StatusTimeout { timeout_ms: 3000 }, exit_code::TIMEOUT),
            (
                CoreError::DeviceBusy {
                    device_id: "cam-1".into(),
                },
                exit_code::CONFLICT,
            ),
            (CoreError::Canceled, exit_code::GENERAL),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "endpoint".into(),
            reason: "invalid URL".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
