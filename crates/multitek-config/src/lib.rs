//! Shared configuration for the Multitek CLI.
//!
//! TOML profiles, API-key resolution (env + keyring + plaintext), and
//! translation to `multitek_core::TabletConfig` / `CoordinatorConfig`.
//! The CLI layers its flag overrides on top.

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

use multitek_core::{
    BackoffConfig, CoordinatorConfig, CoreError, DEFAULT_PORT, TabletConfig, TlsVerification,
};

/// Keyring service name; entries are keyed `"{profile}/api-key"`.
pub const KEYRING_SERVICE: &str = "multitek";

/// Overrides the platform config path when set.
pub const CONFIG_PATH_ENV: &str = "MULTITEK_CONFIG";

const ENV_PREFIX: &str = "MULTITEK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

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

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named tablet profiles.
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
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profiles.keys().cloned().collect(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    30
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A named tablet profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Tablet hostname or IP, without scheme.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Use HTTPS instead of HTTP.
    #[serde(default)]
    pub https: bool,

    /// API key (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Override the default insecure TLS setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Poll interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    /// Upper bound on the retry delay after failures, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max: Option<u64>,
}

impl Profile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            https: false,
            api_key: None,
            api_key_env: None,
            insecure: None,
            timeout: None,
            poll_interval: None,
            backoff_max: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `MULTITEK_CONFIG`, then platform
/// conventions (`~/.config/multitek/config.toml` on Linux).
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "multitek", "multitek").map_or_else(
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
    p.push("multitek");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file and environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, layered over defaults and under
/// `MULTITEK_`-prefixed env (nested keys split on `__`, e.g.
/// `MULTITEK_PROFILES__HOME__HOST`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
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

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the API key from the credential chain.
///
/// `None` is a valid outcome: tablets without a key configured accept
/// unauthenticated requests.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's api_key_env -> env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.api_key.clone().map(SecretString::from)
}

/// Keyring user name for a profile's API key.
pub fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/api-key")
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a validated `TabletConfig` from a profile and global defaults.
pub fn profile_to_tablet_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<TabletConfig, ConfigError> {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };

    let tablet = TabletConfig {
        host: profile.host.trim().to_owned(),
        port: profile.port,
        api_key: resolve_api_key(profile, profile_name),
        https: profile.https,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    };
    tablet
        .validate()
        .map_err(|e| invalid(profile_name, "tablet", &e))?;
    Ok(tablet)
}

/// Build a validated `CoordinatorConfig` from a profile and global defaults.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let mut backoff = BackoffConfig::default();
    if let Some(max) = profile.backoff_max {
        backoff.max = Duration::from_secs(max);
    }

    let config = CoordinatorConfig {
        poll_interval: Duration::from_secs(profile.poll_interval.unwrap_or(defaults.poll_interval)),
        backoff,
        ..CoordinatorConfig::default()
    };
    config
        .validate()
        .map_err(|e| invalid(profile_name, "polling", &e))?;
    Ok(config)
}

/// Check a profile without building anything from it.
pub fn validate_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<(), ConfigError> {
    profile_to_tablet_config(profile, profile_name, defaults)?;
    profile_to_coordinator_config(profile, profile_name, defaults)?;
    Ok(())
}

fn invalid(profile_name: &str, section: &str, err: &CoreError) -> ConfigError {
    let reason = match err {
        CoreError::Config { message } => message.clone(),
        other => other.to_string(),
    };
    ConfigError::Validation {
        field: format!("{section} settings in profile '{profile_name}'"),
        reason,
    }
}
