// ── Domain model ──

pub mod device;
pub mod snapshot;
pub mod status;

pub use device::{Device, DeviceDescriptor, DeviceId, DeviceKind, DeviceState, Platform};
pub use snapshot::{Snapshot, SnapshotDiff};
pub use status::{ConnectionStatus, PollState};
