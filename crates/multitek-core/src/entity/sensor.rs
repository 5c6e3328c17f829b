// ── Tablet sensors ──
//
// Pure derivations from coordinator state. Neither sensor stores anything
// of its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::Coordinator;
use crate::model::ConnectionStatus;

use super::info::TabletInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCountAttributes {
    /// Device count per type label.
    pub device_types: BTreeMap<String, usize>,
    pub tablet_host: String,
    pub tablet_port: u16,
}

/// "Connected Devices": number of relays in the current snapshot.
#[derive(Clone)]
pub struct DeviceCountSensor {
    coordinator: Coordinator,
    unique_id: String,
    tablet: Arc<TabletInfo>,
}

impl DeviceCountSensor {
    pub const NAME: &'static str = "Connected Devices";
    pub const ICON: &'static str = "mdi:devices";

    pub(crate) fn new(coordinator: Coordinator, entry_id: &str, tablet: Arc<TabletInfo>) -> Self {
        Self {
            coordinator,
            unique_id: format!("{entry_id}_device_count"),
            tablet,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn value(&self) -> usize {
        self.coordinator.device_count()
    }

    pub fn attributes(&self) -> DeviceCountAttributes {
        let snapshot = self.coordinator.current_snapshot();
        let mut device_types = BTreeMap::new();
        for device in snapshot.iter() {
            let d = &device.descriptor;
            let label = d
                .type_name
                .clone()
                .unwrap_or_else(|| d.kind.display_name().to_owned());
            *device_types.entry(label).or_insert(0) += 1;
        }
        DeviceCountAttributes {
            device_types,
            tablet_host: self.tablet.host.clone(),
            tablet_port: self.tablet.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatusAttributes {
    pub last_update: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub tablet_host: String,
    pub tablet_port: u16,
}

/// "Connection Status": health of the link to the tablet.
#[derive(Clone)]
pub struct ConnectionStatusSensor {
    coordinator: Coordinator,
    unique_id: String,
    tablet: Arc<TabletInfo>,
}

impl ConnectionStatusSensor {
    pub const NAME: &'static str = "Connection Status";

    pub(crate) fn new(coordinator: Coordinator, entry_id: &str, tablet: Arc<TabletInfo>) -> Self {
        Self {
            coordinator,
            unique_id: format!("{entry_id}_connection_status"),
            tablet,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn value(&self) -> ConnectionStatus {
        self.coordinator.connection_status()
    }

    pub fn icon(&self) -> &'static str {
        if self.value().is_connected() {
            "mdi:lan-connect"
        } else {
            "mdi:lan-disconnect"
        }
    }

    pub fn attributes(&self) -> ConnectionStatusAttributes {
        let state = self.coordinator.poll_state();
        ConnectionStatusAttributes {
            last_update: state.last_success,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error,
            tablet_host: self.tablet.host.clone(),
            tablet_port: self.tablet.port,
        }
    }
}
