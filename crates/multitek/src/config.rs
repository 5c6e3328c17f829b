//! CLI configuration: thin wrapper around `multitek_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--host,
//! --api-key, etc.) on top of the shared profile handling.

use std::time::Duration;

use secrecy::SecretString;

use multitek_core::{CoordinatorConfig, TabletConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use multitek_config::{
    Config, Profile, config_path, keyring_user, load_config_or_default, save_config,
};

/// Everything a tablet-bound command needs.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub tablet: TabletConfig,
    pub coordinator: CoordinatorConfig,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build tablet and coordinator settings from the config file, the active
/// profile, and CLI overrides. Flags take priority over profile values.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match (cfg.profiles.get(&profile_name), &global.host) {
        (Some(profile), _) => profile.clone(),
        // No profile: flags / env alone are enough.
        (None, Some(host)) => Profile::new(host.clone()),
        (None, None) if global.profile.is_some() => {
            return Err(multitek_config::ConfigError::ProfileNotFound {
                name: profile_name,
                available: cfg.profiles.keys().cloned().collect(),
            }
            .into());
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    apply_overrides(&mut profile, global);

    let mut tablet =
        multitek_config::profile_to_tablet_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(ref key) = global.api_key {
        tablet.api_key = Some(SecretString::from(key.clone()));
    }
    let coordinator =
        multitek_config::profile_to_coordinator_config(&profile, &profile_name, &cfg.defaults)?;

    Ok(Resolved {
        profile_name,
        tablet,
        coordinator,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if global.https {
        profile.https = true;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}

/// Poll interval override for `watch`.
pub fn with_interval(
    mut coordinator: CoordinatorConfig,
    secs: Option<u64>,
) -> Result<CoordinatorConfig, CliError> {
    if let Some(secs) = secs {
        coordinator.poll_interval = Duration::from_secs(secs);
        coordinator.validate()?;
    }
    Ok(coordinator)
}
