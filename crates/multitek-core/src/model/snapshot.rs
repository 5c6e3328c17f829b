// ── Device snapshot ──
//
// The complete view of a tablet's relays at one instant. Built once per
// successful poll and never mutated afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::device::{Device, DeviceId, DeviceKind};

/// Immutable, ordered mapping of every known relay.
///
/// Iteration order is the order the tablet listed its devices.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    devices: IndexMap<DeviceId, Arc<Device>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The startup snapshot: no devices, never fetched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from one poll's devices.
    ///
    /// If the tablet lists the same id twice, the later record wins and keeps
    /// the earlier position.
    pub fn from_devices(devices: impl IntoIterator<Item = Device>, fetched_at: DateTime<Utc>) -> Self {
        let mut map = IndexMap::new();
        for device in devices {
            let id = device.id().clone();
            if map.insert(id.clone(), Arc::new(device)).is_some() {
                warn!(device_id = %id, "duplicate device id in poll response, keeping last");
            }
        }
        Self {
            devices: map,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Arc<Device>> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    /// When the poll that produced this snapshot completed. `None` before the
    /// first successful poll.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Device count per kind display name.
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for device in self.devices.values() {
            *counts.entry(device.kind().display_name()).or_insert(0) += 1;
        }
        counts
    }

    /// Devices of one kind, in tablet order.
    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values().filter(move |d| d.kind() == kind)
    }
}

/// Identifier-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
    /// Present in both, with different metadata or reading.
    pub changed: Vec<DeviceId>,
}

impl SnapshotDiff {
    /// Compare `old` to `new`. `added` and `changed` follow `new`'s order,
    /// `removed` follows `old`'s.
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        let mut diff = Self::default();

        for (id, device) in &new.devices {
            match old.devices.get(id) {
                None => diff.added.push(id.clone()),
                Some(prev) if prev.differs_from(device) => diff.changed.push(id.clone()),
                Some(_) => {}
            }
        }

        diff.removed = old
            .devices
            .keys()
            .filter(|id| !new.devices.contains_key(*id))
            .cloned()
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
