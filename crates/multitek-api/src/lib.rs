//! Async Rust client for the Multitek smart-home tablet's local HTTP API.
//!
//! The tablet exposes a small REST surface on `http://{host}:{port}`:
//! a status probe, a self-description document, the full relay/device list,
//! and per-relay write endpoints. [`TabletClient`] wraps these endpoints and
//! returns the raw wire types from [`models`]; domain conversion and state
//! tracking live in `multitek-core`.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), multitek_api::Error> {
//! use multitek_api::{TabletClient, TransportConfig};
//!
//! let base = TabletClient::base_url_for("192.168.1.50", 8123)?;
//! let client = TabletClient::new(base, &TransportConfig::default())?;
//! for device in client.list_devices().await? {
//!     println!("{} -> {}", device.id, device.state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::TabletClient;
pub use error::Error;
pub use models::{DiscoveryInfo, RawDevice, RelayAck, TabletStatus};
pub use transport::{TlsMode, TransportConfig};
