//! Shared configuration for ptzlink.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `ptzlink_core::ClientConfig`. The CLI layers its own
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ptzlink_core::{ClientConfig, Credential, DispatchConfig, EncoderConfig, ReconnectPolicy};

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "ptzlink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named endpoint profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: explicit choice, then `default_profile`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds allowed for each WebSocket handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_status_timeout")]
    pub status_timeout_ms: u64,

    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            connect_timeout_secs: default_connect_timeout(),
            status_timeout_ms: default_status_timeout(),
            throttle_ms: default_throttle(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_status_timeout() -> u64 {
    3000
}
fn default_throttle() -> u64 {
    120
}

/// A named control endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Control endpoint URL (e.g. "wss://cams.example.com/api").
    pub endpoint: String,

    /// Channel path segment. Default: "ptz".
    pub channel: Option<String>,

    /// Identity sent in `connect`.
    pub user_id: Option<String>,

    /// Bearer token (plaintext: prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Wait for `connect_ack` before sending commands.
    pub require_connect_ack: Option<bool>,

    // ── Tuning overrides ──
    pub gain: Option<f64>,
    pub neutral: Option<f64>,
    pub throttle_ms: Option<u64>,
    pub move_timeout_ms: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub status_timeout_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "ptzlink", "ptzlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ptzlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, then `PTZLINK_`-prefixed env vars
/// (`PTZLINK_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PTZLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bearer token: `token_env` → system keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        tracing::debug!(env = %env_name, "token env var not set");
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

/// Identity sent in `connect`: profile → `PTZLINK_USER_ID` → login name.
pub fn resolve_user_id(profile: &Profile) -> String {
    profile
        .user_id
        .clone()
        .or_else(|| std::env::var("PTZLINK_USER_ID").ok())
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_else(|| "ptzlink".into())
}

// ── Translation to runtime config ───────────────────────────────────

/// Build a `ClientConfig` from a profile and global defaults, resolving
/// the token through the credential chain.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    build_client_config(profile, defaults, Credential::new(resolve_user_id(profile), token))
}

/// Build a `ClientConfig` with an already-resolved credential.
pub fn build_client_config(
    profile: &Profile,
    defaults: &Defaults,
    credential: Credential,
) -> Result<ClientConfig, ConfigError> {
    let endpoint: url::Url = profile
        .endpoint
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", profile.endpoint),
        })?;

    let mut config = ClientConfig::new(endpoint, credential);

    if let Some(ref channel) = profile.channel {
        if channel.trim().is_empty() {
            return Err(validation("channel", "must not be empty"));
        }
        config.channel.clone_from(channel);
    }

    if let Some(ack) = profile.require_connect_ack {
        config.require_connect_ack = ack;
    }

    let encoder_defaults = EncoderConfig::default();
    let gain = profile.gain.unwrap_or(encoder_defaults.gain);
    if !gain.is_finite() || gain < 0.0 {
        return Err(validation("gain", "must be a non-negative number"));
    }
    let neutral = profile.neutral.unwrap_or(encoder_defaults.neutral);
    if !(0.0..=1.0).contains(&neutral) {
        return Err(validation("neutral", "must be within [0, 1]"));
    }
    config.encoder = EncoderConfig {
        gain,
        neutral,
        half_range: neutral.min(1.0 - neutral),
        ..encoder_defaults
    };

    let throttle_ms = profile.throttle_ms.unwrap_or(defaults.throttle_ms);
    if throttle_ms == 0 {
        return Err(validation("throttle_ms", "must be greater than zero"));
    }
    config.dispatch = DispatchConfig {
        throttle_interval: Duration::from_millis(throttle_ms),
        move_timeout_ms: profile
            .move_timeout_ms
            .unwrap_or(DispatchConfig::default().move_timeout_ms),
    };

    let reconnect_defaults = ReconnectPolicy::default();
    let max_attempts = profile
        .reconnect_attempts
        .unwrap_or(reconnect_defaults.max_attempts);
    if max_attempts == 0 {
        return Err(validation("reconnect_attempts", "must be at least 1"));
    }
    let initial_delay = profile
        .reconnect_delay_ms
        .map_or(reconnect_defaults.initial_delay, Duration::from_millis);
    let max_delay = profile
        .reconnect_max_delay_ms
        .map_or(reconnect_defaults.max_delay, Duration::from_millis)
        .max(initial_delay);
    config.reconnect = ReconnectPolicy {
        initial_delay,
        max_delay,
        max_attempts,
    };

    config.connect_timeout = Duration::from_secs(
        profile
            .connect_timeout_secs
            .unwrap_or(defaults.connect_timeout_secs),
    );
    config.status_timeout = Duration::from_millis(
        profile
            .status_timeout_ms
            .unwrap_or(defaults.status_timeout_ms),
    );

    Ok(config)
}

fn validation(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn profile() -> Profile {
        Profile {
            endpoint: "wss://cams.example.com/api".into(),
            user_id: Some("operator".into()),
            token: Some("plain-token".into()),
            ..Profile::default()
        }
    }

    fn credential() -> Credential {
        Credential::new("operator", SecretString::from("t".to_owned()))
    }

    #[test]
    fn defaults_flow_into_client_config() {
        let config = build_client_config(&profile(), &Defaults::default(), credential()).unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://cams.example.com/api");
        assert_eq!(config.channel, "ptz");
        assert_eq!(config.dispatch.throttle_interval, Duration::from_millis(120));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.status_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn profile_overrides_win() {
        let p = Profile {
            channel: Some("ptz-v2".into()),
            throttle_ms: Some(80),
            reconnect_attempts: Some(5),
            reconnect_delay_ms: Some(250),
            gain: Some(0.8),
            require_connect_ack: Some(true),
            ..profile()
        };
        let config = build_client_config(&p, &Defaults::default(), credential()).unwrap();
        assert_eq!(config.channel, "ptz-v2");
        assert_eq!(config.dispatch.throttle_interval, Duration::from_millis(80));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert!(config.require_connect_ack);
        assert!((config.encoder.gain - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_url = Profile {
            endpoint: "not a url".into(),
            ..profile()
        };
        assert!(matches!(
            build_client_config(&bad_url, &Defaults::default(), credential()),
            Err(ConfigError::Validation { ref field, .. }) if field == "endpoint"
        ));

        let zero_attempts = Profile {
            reconnect_attempts: Some(0),
            ..profile()
        };
        assert!(build_client_config(&zero_attempts, &Defaults::default(), credential()).is_err());

        let bad_neutral = Profile {
            neutral: Some(1.5),
            ..profile()
        };
        assert!(build_client_config(&bad_neutral, &Defaults::default(), credential()).is_err());
    }

    #[test]
    fn plaintext_token_is_last_resort() {
        let p = Profile {
            token_env: Some("PTZLINK_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
            ..profile()
        };
        let token = resolve_token(&p, "ptzlink-unit-test-profile").unwrap();
        assert_eq!(token.expose_secret(), "plain-token");
    }

    #[test]
    fn missing_token_is_an_error() {
        let p = Profile {
            token: None,
            ..profile()
        };
        let err = resolve_token(&p, "ptzlink-unit-test-profile").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn explicit_profile_beats_default() {
        let cfg = Config::default();
        assert_eq!(cfg.active_profile_name(None), "default");
        assert_eq!(cfg.active_profile_name(Some("lab")), "lab");
        assert!(matches!(
            cfg.profile("lab"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }
}
