use thiserror::Error;

/// Top-level error type for the `multitek-api` crate.
///
/// Covers every failure mode of the tablet's HTTP surface. `multitek-core`
/// classifies these into unreachable / unauthorized / malformed outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The tablet rejected the `X-HA-Access` key (or none was sent).
    #[error("Unauthorized (HTTP {status}): missing or invalid API key")]
    Unauthorized { status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success status other than 401/403.
    #[error("Tablet returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the tablet refused our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if the tablet could not be reached at all
    /// (connection refused, DNS failure, timeout).
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns `true` if the tablet answered with a payload we do not understand.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Deserialization { .. } => true,
            Self::Transport(e) => e.is_decode() || e.is_body(),
            _ => false,
        }
    }

    /// Returns `true` if this was a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// HTTP status code, if the tablet answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status } | Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
