// ── Connection health ──

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health of the poll target, derived from poll outcomes only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    /// No poll has completed yet.
    #[default]
    Pending,
    Connected,
    Unauthorized,
    Unreachable,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Everything the coordinator knows about its recent poll history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollState {
    pub status: ConnectionStatus,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Delay before the next scheduled poll.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
}

impl PollState {
    pub(crate) fn initial(interval: Duration) -> Self {
        Self {
            retry_delay: interval,
            ..Self::default()
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
