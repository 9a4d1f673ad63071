//! Flag overrides on top of `ptzlink_config` profiles.
//!
//! Core never sees CLI types: this is the one place global flags, the
//! config file and the credential chain are folded into a `ClientConfig`.

use secrecy::SecretString;

use ptzlink_config::{Config, Profile};
use ptzlink_core::{ClientConfig, Credential};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Comma-separated profile names for help text.
pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build the runtime config: flag > env > profile > defaults.
pub fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let cfg = ptzlink_config::load_config_or_default();
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        None => Profile::default(),
    };

    apply_overrides(&mut profile, global);
    if profile.endpoint.trim().is_empty() {
        return Err(CliError::NoConfig {
            path: ptzlink_config::config_path().display().to_string(),
        });
    }

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => ptzlink_config::resolve_token(&profile, &profile_name)?,
    };
    let credential = Credential::new(ptzlink_config::resolve_user_id(&profile), token);

    tracing::debug!(profile = %profile_name, "resolved client configuration");
    Ok(ptzlink_config::build_client_config(
        &profile,
        &cfg.defaults,
        credential,
    )?)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if let Some(ref user) = global.user {
        profile.user_id = Some(user.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.connect_timeout_secs = Some(timeout);
    }
}
