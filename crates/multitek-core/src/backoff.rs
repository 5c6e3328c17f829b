// ── Retry backoff ──
//
// Exponential delay between failed polls, capped at a ceiling.

use std::time::Duration;

use crate::config::config_err;
use crate::error::CoreError;

/// Exponential backoff parameters.
///
/// The delay after `n` consecutive failures is
/// `min(initial * multiplier^(n-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub multiplier: u32,
    /// Ceiling. Also the fixed retry interval while unauthorized.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            multiplier: 2,
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffConfig {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        self.multiplier
            .checked_pow(exponent)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial < Duration::from_secs(1) {
            return Err(config_err("initial backoff must be at least 1 second"));
        }
        if self.multiplier == 0 {
            return Err(config_err("backoff multiplier must be at least 1"));
        }
        if self.max < self.initial {
            return Err(config_err(format!(
                "backoff ceiling ({}s) must not be below the initial backoff ({}s)",
                self.max.as_secs(),
                self.initial.as_secs()
            )));
        }
        Ok(())
    }
}
