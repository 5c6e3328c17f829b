// ── Runtime configuration ──
//
// These types describe *where* the tablet is and *how often* to poll it.
// They never touch disk. The CLI builds them from a config profile and
// hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use multitek_api::TabletClient;
use multitek_api::transport::{TlsMode, TransportConfig};

pub use crate::backoff::BackoffConfig;
use crate::error::CoreError;

/// Port the tablet's local API listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8123;

/// Interval between polls while the tablet is healthy.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// TLS verification strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Skip verification (self-signed tablets).
    DangerAcceptInvalid,
}

/// How to reach a single tablet.
#[derive(Debug, Clone)]
pub struct TabletConfig {
    /// Hostname or IP address, without scheme or path.
    pub host: String,
    pub port: u16,
    /// Sent as `X-HA-Access` on every request when set.
    pub api_key: Option<SecretString>,
    /// Use `https://` instead of `http://`.
    pub https: bool,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl TabletConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            api_key: None,
            https: false,
            tls: TlsVerification::default(),
            timeout: multitek_api::transport::DEFAULT_TIMEOUT,
        }
    }

    /// `"{host}:{port}"`, the tablet's identity in the device registry.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Root URL of the tablet's API.
    pub fn base_url(&self) -> Result<Url, CoreError> {
        let scheme = if self.https { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}:{}", self.host, self.port)).map_err(|e| {
            CoreError::Config {
                message: format!("invalid tablet address {}: {e}", self.identifier()),
            }
        })
    }

    /// Validate and build an HTTP client for this tablet.
    pub fn client(&self) -> Result<TabletClient, CoreError> {
        self.validate()?;
        Ok(TabletClient::new(self.base_url()?, &self.transport())?)
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            api_key: self.api_key.clone(),
        }
    }

    /// Reject configurations that can never produce a working client.
    pub fn validate(&self) -> Result<(), CoreError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(config_err("host must not be empty"));
        }
        if host.contains("://") || host.contains('/') {
            return Err(config_err(format!(
                "host must be a bare hostname or IP address, got {host:?}"
            )));
        }
        if self.port == 0 {
            return Err(config_err("port must be between 1 and 65535"));
        }
        if self.timeout < Duration::from_secs(1) {
            return Err(config_err("timeout must be at least 1 second"));
        }
        self.base_url().map(|_| ())
    }
}

/// What to do when a scheduled poll is due while the previous one is
/// still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Skip the new tick; the running poll finishes.
    #[default]
    Skip,
    /// Abandon the running poll and start a fresh one.
    CancelPrevious,
}

/// Timing behaviour of the update coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
    pub overlap: OverlapPolicy,
    /// Request a coalesced refresh after every successful command.
    pub refresh_after_command: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffConfig::default(),
            overlap: OverlapPolicy::default(),
            refresh_after_command: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval < Duration::from_secs(1) {
            return Err(config_err("poll interval must be at least 1 second"));
        }
        self.backoff.validate()
    }
}

pub(crate) fn config_err(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tablet_firmware() {
        let tablet = TabletConfig::new("192.168.1.50");
        assert_eq!(tablet.port, 8123);
        assert_eq!(tablet.timeout, Duration::from_secs(10));
        assert_eq!(tablet.identifier(), "192.168.1.50:8123");
        assert_eq!(
            tablet.base_url().unwrap().as_str(),
            "http://192.168.1.50:8123/"
        );

        let coord = CoordinatorConfig::default();
        assert_eq!(coord.poll_interval, Duration::from_secs(30));
        assert_eq!(coord.overlap, OverlapPolicy::Skip);
        assert!(coord.refresh_after_command);
    }

    #[test]
    fn host_with_scheme_is_rejected() {
        let tablet = TabletConfig::new("http://tablet.local");
        assert!(matches!(tablet.validate(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn empty_host_and_zero_port_are_rejected() {
        assert!(TabletConfig::new("  ").validate().is_err());

        let mut tablet = TabletConfig::new("tablet.local");
        tablet.port = 0;
        assert!(tablet.validate().is_err());
    }

    #[test]
    fn sub_second_timings_are_rejected() {
        let mut tablet = TabletConfig::new("tablet.local");
        tablet.timeout = Duration::from_millis(200);
        assert!(tablet.validate().is_err());

        let coord = CoordinatorConfig {
            poll_interval: Duration::from_millis(500),
            ..CoordinatorConfig::default()
        };
        assert!(coord.validate().is_err());
    }

    #[test]
    fn transport_carries_key_and_tls() {
        let mut tablet = TabletConfig::new("tablet.local");
        tablet.api_key = Some(SecretString::from("k"));
        tablet.tls = TlsVerification::DangerAcceptInvalid;
        let transport = tablet.transport();
        assert!(transport.api_key.is_some());
        assert_eq!(transport.tls, TlsMode::DangerAcceptInvalid);
    }
}
