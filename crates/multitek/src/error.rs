//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use multitek_config::ConfigError;
use multitek_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const COMMAND: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the tablet: {reason}")]
    #[diagnostic(
        code(multitek::connection_failed),
        help(
            "Check that the tablet is powered on and on the same network,\n\
             and that host and port are correct.\n\
             Try: multitek status --host <ip>"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(multitek::timeout),
        help("Increase the timeout with --timeout or check the tablet's network link.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("The tablet rejected the API key")]
    #[diagnostic(
        code(multitek::auth_failed),
        help(
            "Check the key shown in the tablet's Home Assistant settings.\n\
             Pass it with --api-key, set MULTITEK_API_KEY, or run:\n\
             multitek config set-key --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(multitek::not_found),
        help("Run: multitek devices list to see available devices")
    )]
    NotFound { identifier: String },

    #[error("Command for device '{identifier}' failed: {message}")]
    #[diagnostic(code(multitek::command_failed))]
    CommandFailed { identifier: String, message: String },

    #[error("Unexpected response from the tablet: {message}")]
    #[diagnostic(
        code(multitek::malformed),
        help("The tablet firmware may be incompatible. Re-run with -vv for details.")
    )]
    Malformed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(multitek::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(multitek::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.<name>] in the config file."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No tablet configured")]
    #[diagnostic(
        code(multitek::no_config),
        help(
            "Pass --host <ip> or set MULTITEK_HOST, or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(multitek::config))]
    Config(ConfigError),

    #[error("Keyring access failed: {0}")]
    #[diagnostic(code(multitek::keyring))]
    Keyring(#[from] keyring::Error),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Polling was stopped before the request finished")]
    #[diagnostic(code(multitek::stopped))]
    Stopped,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::CommandFailed { .. } => exit_code::COMMAND,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Fill in the profile name for auth failures raised below the CLI.
    pub fn with_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unreachable { reason } => CliError::ConnectionFailed { reason },

            CoreError::Unauthorized { .. } => CliError::AuthFailed {
                profile: "<name>".into(),
            },

            CoreError::Malformed { message } => CliError::Malformed { message },

            CoreError::CommandFailed { device_id, message } => CliError::CommandFailed {
                identifier: device_id.to_string(),
                message,
            },

            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                identifier: device_id.to_string(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "tablet".into(),
                reason: message,
            },

            CoreError::Stopped => CliError::Stopped,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

/// Transport errors from direct client calls (`status`). Timeouts keep
/// their own exit code; everything else is classified like a poll error.
pub fn from_api(err: multitek_api::Error, timeout_secs: u64) -> CliError {
    if err.is_timeout() {
        return CliError::Timeout {
            seconds: timeout_secs,
        };
    }
    CoreError::from(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use multitek_core::DeviceId;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::Unreachable {
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Unauthorized {
                    message: "HTTP 401".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::DeviceNotFound {
                    device_id: DeviceId::from("9"),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::CommandFailed {
                    device_id: DeviceId::from("9"),
                    message: "relay locked".into(),
                },
                exit_code::COMMAND,
            ),
            (
                CoreError::Config {
                    message: "host must not be empty".into(),
                },
                exit_code::USAGE,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn missing_profile_lists_alternatives() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "office".into(),
            available: vec!["cabin".into(), "home".into()],
        });
        match err {
            CliError::ProfileNotFound { available, .. } => assert_eq!(available, "cabin, home"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
