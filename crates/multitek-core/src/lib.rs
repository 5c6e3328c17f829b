//! Polling update layer between `multitek-api` and host consumers (CLI,
//! automation platforms).
//!
//! - **[`Coordinator`]**: owns the poll loop for one tablet.
//!   [`start()`](Coordinator::start) polls immediately and then on a fixed
//!   interval, backing off exponentially on failure. Each successful poll
//!   atomically replaces the [`Snapshot`] and fans a [`CoordinatorUpdate`]
//!   out to subscribers. [`refresh_now()`](Coordinator::refresh_now) runs a
//!   single inline poll for one-shot use.
//!
//! - **[`DeviceSource`]**: the seam the coordinator reads and writes
//!   through. Implemented for [`multitek_api::TabletClient`].
//!
//! - **Entities** ([`entity`]): [`RelayEntity`] adapters with optimistic
//!   command handling, the [`EntityManager`] that creates them as devices
//!   appear, and the device-count and connection-status sensors.
//!
//! - **Domain model** ([`model`]): [`Device`], [`Snapshot`],
//!   [`SnapshotDiff`], [`ConnectionStatus`], [`PollState`].

pub mod backoff;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod model;
pub mod source;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    BackoffConfig, CoordinatorConfig, DEFAULT_POLL_INTERVAL, DEFAULT_PORT, OverlapPolicy,
    TabletConfig, TlsVerification,
};
pub use coordinator::{Coordinator, CoordinatorUpdate, Listener, SubscriptionHandle};
pub use entity::{
    ConnectionStatusSensor, DeviceCountSensor, EntityEvent, EntityManager, RelayEntity,
    RelayState, TabletInfo,
};
pub use error::CoreError;
pub use source::DeviceSource;
pub use stream::{PollStateStream, SnapshotStream, StateStream};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ConnectionStatus, Device, DeviceDescriptor, DeviceId, DeviceKind, DeviceState, Platform,
    PollState, Snapshot, SnapshotDiff,
};
