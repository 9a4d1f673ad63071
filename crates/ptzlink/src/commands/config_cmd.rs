//! Config subcommand handlers.

use std::str::FromStr;

use dialoguer::{Confirm, Input, Select};
use serde::Serialize;
use tabled::Tabled;

use ptzlink_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::available_profiles;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_field<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: key.into(),
        reason: format!("must be {expected}, got '{value}'"),
    })
}

/// Copy of the config with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("********".into());
        }
    }
    cfg
}

const SETTABLE_KEYS: &str = "endpoint, channel, user_id, token, token_env, require_connect_ack, \
     gain, neutral, throttle_ms, move_timeout_ms, reconnect_attempts, reconnect_delay_ms, \
     reconnect_max_delay_ms, connect_timeout_secs, status_timeout_ms";

/// Apply `key = value` to a profile.
pub fn set_profile_field(profile: &mut Profile, key: &str, value: &str) -> Result<(), CliError> {
    let ms = "a number of milliseconds";
    match key.replace('-', "_").as_str() {
        "endpoint" => {
            url::Url::parse(value).map_err(|e| CliError::Validation {
                field: "endpoint".into(),
                reason: format!("invalid URL: {e}"),
            })?;
            profile.endpoint = value.to_owned();
        }
        "channel" => profile.channel = Some(value.to_owned()),
        "user_id" | "user" => profile.user_id = Some(value.to_owned()),
        "token" => profile.token = Some(value.to_owned()),
        "token_env" => profile.token_env = Some(value.to_owned()),
        "require_connect_ack" => {
            profile.require_connect_ack = Some(parse_field(key, value, "'true' or 'false'")?);
        }
        "gain" => profile.gain = Some(parse_field(key, value, "a number")?),
        "neutral" => profile.neutral = Some(parse_field(key, value, "a number")?),
        "throttle_ms" => profile.throttle_ms = Some(parse_field(key, value, ms)?),
        "move_timeout_ms" => profile.move_timeout_ms = Some(parse_field(key, value, ms)?),
        "reconnect_attempts" => {
            profile.reconnect_attempts = Some(parse_field(key, value, "a whole number")?);
        }
        "reconnect_delay_ms" => profile.reconnect_delay_ms = Some(parse_field(key, value, ms)?),
        "reconnect_max_delay_ms" => {
            profile.reconnect_max_delay_ms = Some(parse_field(key, value, ms)?);
        }
        "connect_timeout_secs" => {
            profile.connect_timeout_secs = Some(parse_field(key, value, "a number of seconds")?);
        }
        "status_timeout_ms" => profile.status_timeout_ms = Some(parse_field(key, value, ms)?),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!("unknown config key '{other}'. Valid keys: {SETTABLE_KEYS}"),
            });
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ProfileSummary {
    name: String,
    endpoint: String,
    default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&ptzlink_config::load_config_or_default());
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?}\n# {e}")),
                |c| c.profiles.keys().cloned().collect::<Vec<_>>().join("\n"),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = ptzlink_config::load_config_or_default();
            let profile_name = cfg.active_profile_name(global.profile.as_deref());

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_profile_field(profile, &key, &value)?;

            ptzlink_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = ptzlink_config::load_config_or_default();
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: ptzlink config init");
                return Ok(());
            }
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let summaries: Vec<ProfileSummary> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| ProfileSummary {
                    name: name.clone(),
                    endpoint: profile.endpoint.clone(),
                    default: name == default,
                })
                .collect();
            let out = output::render_list(
                global.output,
                &summaries,
                |s| ProfileRow {
                    marker: if s.default { "*" } else { "" },
                    name: s.name.clone(),
                    endpoint: s.endpoint.clone(),
                },
                |s| s.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Use <name> ──────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = ptzlink_config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            ptzlink_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { profile } => {
            let cfg = ptzlink_config::load_config_or_default();
            let profile_name = profile
                .unwrap_or_else(|| cfg.active_profile_name(global.profile.as_deref()));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name: profile_name,
                });
            }

            let token = rpassword::prompt_password("Bearer token: ").map_err(prompt_err)?;
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            ptzlink_config::store_token(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = ptzlink_config::config_path();
    eprintln!("ptzlink configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = ptzlink_config::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let mut profile = cfg.profiles.get(&profile_name).cloned().unwrap_or_default();

    let endpoint: String = Input::new()
        .with_prompt("Control endpoint URL")
        .default(if profile.endpoint.is_empty() {
            "wss://127.0.0.1:8443/api".into()
        } else {
            profile.endpoint.clone()
        })
        .interact_text()
        .map_err(prompt_err)?;
    set_profile_field(&mut profile, "endpoint", &endpoint)?;

    let user_id: String = Input::new()
        .with_prompt("User id")
        .default(ptzlink_config::resolve_user_id(&profile))
        .interact_text()
        .map_err(prompt_err)?;
    profile.user_id = Some(user_id);

    let token = rpassword::prompt_password("Bearer token: ").map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }

    let store_choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let store_selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(store_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if store_selection == 0 {
        ptzlink_config::store_token(&profile_name, &token)?;
        profile.token = None;
        eprintln!("   ✓ Token stored in system keyring");
    } else {
        profile.token = Some(token);
    }

    let require_ack = Confirm::new()
        .with_prompt("Wait for connect_ack before sending commands?")
        .default(profile.require_connect_ack.unwrap_or(false))
        .interact()
        .map_err(prompt_err)?;
    profile.require_connect_ack = require_ack.then_some(true);

    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    ptzlink_config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: ptzlink status <device>");
    Ok(())
}
