// ── Core error types ──
//
// User-facing errors from multitek-core. Consumers never see raw HTTP
// status codes or JSON parse failures; the `From<multitek_api::Error>`
// impl classifies transport errors into the variants below.

use thiserror::Error;

use crate::model::DeviceId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Poll / connection errors ─────────────────────────────────────
    #[error("Tablet unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Tablet rejected the API key: {message}")]
    Unauthorized { message: String },

    #[error("Tablet sent an unexpected payload: {message}")]
    Malformed { message: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command on device {device_id} failed: {message}")]
    CommandFailed { device_id: DeviceId, message: String },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: DeviceId },

    // ── Lifecycle / configuration ────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Coordinator is stopped")]
    Stopped,
}

impl CoreError {
    /// Attach a device id to a failure raised by a command.
    ///
    /// A write that failed, timed out or came back garbled is a
    /// [`CoreError::CommandFailed`]; only a rejected key keeps its class.
    pub(crate) fn for_command(self, device_id: &DeviceId) -> Self {
        match self {
            CoreError::Unreachable { reason: message } | CoreError::Malformed { message } => {
                CoreError::CommandFailed {
                    device_id: device_id.clone(),
                    message,
                }
            }
            other => other,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<multitek_api::Error> for CoreError {
    fn from(err: multitek_api::Error) -> Self {
        if err.is_unauthorized() {
            return CoreError::Unauthorized {
                message: err.to_string(),
            };
        }
        if err.is_unreachable() {
            return CoreError::Unreachable {
                reason: err.to_string(),
            };
        }
        if err.is_malformed() {
            return CoreError::Malformed {
                message: err.to_string(),
            };
        }

        match err {
            multitek_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            multitek_api::Error::Tls(msg) => CoreError::Config { message: msg },
            // The tablet's service is down even though the host answered.
            other @ multitek_api::Error::Http { .. } if other.status().is_some_and(|s| s >= 500) => {
                CoreError::Unreachable {
                    reason: other.to_string(),
                }
            }
            other @ multitek_api::Error::Transport(_) => CoreError::Unreachable {
                reason: other.to_string(),
            },
            // A 4xx on a known endpoint means the firmware speaks a different API.
            other => CoreError::Malformed {
                message: other.to_string(),
            },
        }
    }
}
