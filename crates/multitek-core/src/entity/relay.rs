// ── Relay entity ──
//
// One controllable relay as the host platform sees it. Commands flip the
// local state before the write is sent and reconcile once the tablet
// answers or the next poll arrives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::{Device, DeviceId, DeviceKind, Platform};

use super::info::TabletInfo;
use super::relay_state::{Begin, RelayState, RelayTracker};

/// Extra state attributes exposed alongside a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayAttributes {
    pub device_type: String,
    pub room: String,
    pub flat: String,
    pub favourite: bool,
}

/// Host-facing adapter for a single relay.
pub struct RelayEntity {
    coordinator: Coordinator,
    unique_id: String,
    device_id: DeviceId,
    tablet: Arc<TabletInfo>,
    /// Last reported record. Kept after the device disappears so the
    /// entity still has a name and kind.
    device: ArcSwap<Device>,
    tracker: Mutex<RelayTracker>,
    state_tx: watch::Sender<RelayState>,
}

impl std::fmt::Debug for RelayEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEntity")
            .field("unique_id", &self.unique_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RelayEntity {
    pub(crate) fn new(
        coordinator: Coordinator,
        entry_id: &str,
        tablet: Arc<TabletInfo>,
        device: Arc<Device>,
    ) -> Self {
        let tracker = RelayTracker::new(Some(device.is_on()));
        let (state_tx, _) = watch::channel(tracker.state());
        Self {
            coordinator,
            unique_id: format!("{entry_id}_{}", device.id()),
            device_id: device.id().clone(),
            tablet,
            device: ArcSwap::new(device),
            tracker: Mutex::new(tracker),
            state_tx,
        }
    }

    // ── Identity ─────────────────────────────────────────────────

    /// `"{entry_id}_{device_id}"`.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn name(&self) -> String {
        self.device.load().name().to_owned()
    }

    pub fn kind(&self) -> DeviceKind {
        self.device.load().kind()
    }

    pub fn icon(&self) -> &'static str {
        self.kind().icon()
    }

    pub fn platform(&self) -> Platform {
        self.kind().platform()
    }

    pub fn tablet(&self) -> &TabletInfo {
        &self.tablet
    }

    pub fn attributes(&self) -> RelayAttributes {
        let device = self.device.load();
        let d = &device.descriptor;
        RelayAttributes {
            device_type: d
                .type_name
                .clone()
                .unwrap_or_else(|| d.kind.display_name().to_owned()),
            room: d.room.clone().unwrap_or_default(),
            flat: d.flat.clone().unwrap_or_default(),
            favourite: d.favourite,
        }
    }

    // ── State ────────────────────────────────────────────────────

    pub fn state(&self) -> RelayState {
        self.tracker().state()
    }

    /// `None` while the device is unknown.
    pub fn is_on(&self) -> Option<bool> {
        self.state().is_on()
    }

    /// Shutter position from the last poll.
    pub fn position(&self) -> Option<u8> {
        self.device.load().state.position
    }

    /// False while the tablet is not connected or the device is unknown.
    pub fn available(&self) -> bool {
        self.coordinator.connection_status().is_connected() && self.state() != RelayState::Unknown
    }

    /// Receiver that sees every displayed-state change.
    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state_tx.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.drive(true).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.drive(false).await
    }

    /// Flip the relay relative to what is displayed.
    ///
    /// Uses the tablet's toggle endpoint when nothing is pending, so the
    /// tablet decides the final state; otherwise sends an explicit target.
    pub async fn toggle(&self) -> Result<(), CoreError> {
        let (target, pending) = {
            let tracker = self.tracker();
            (tracker.toggle_target(), tracker.state().is_pending())
        };
        let Some(target) = target else {
            return Err(self.not_found());
        };

        if !self.begin(target)? {
            return Ok(());
        }
        let result = if pending {
            self.coordinator
                .set_device_state(&self.device_id, target)
                .await
        } else {
            self.coordinator.toggle_device(&self.device_id).await
        };
        self.finish(target, result.map(|ack| ack.state))
    }

    async fn drive(&self, target: bool) -> Result<(), CoreError> {
        if !self.begin(target)? {
            return Ok(());
        }
        let result = self
            .coordinator
            .set_device_state(&self.device_id, target)
            .await;
        self.finish(target, result.map(|ack| ack.state))
    }

    /// Flip locally. Returns `false` for an acknowledged no-op.
    fn begin(&self, target: bool) -> Result<bool, CoreError> {
        let outcome = self.update(|t| t.begin(target));
        match outcome {
            Begin::Write => Ok(true),
            Begin::Noop => {
                debug!(entity = %self.unique_id, target, "relay already in target state");
                Ok(false)
            }
            Begin::Unknown => Err(self.not_found()),
        }
    }

    fn finish(&self, target: bool, result: Result<Option<bool>, CoreError>) -> Result<(), CoreError> {
        match result {
            Ok(reported) => {
                self.update(|t| t.ack(target, reported));
                Ok(())
            }
            Err(e) => {
                debug!(entity = %self.unique_id, error = %e, "relay write failed, reverting");
                self.update(|t| t.fail(target));
                Err(e)
            }
        }
    }

    // ── Poll reconciliation ──────────────────────────────────────

    /// Apply a successful poll. `None` means the device was absent.
    pub(crate) fn observe(&self, device: Option<&Arc<Device>>) -> bool {
        if let Some(device) = device {
            self.device.store(Arc::clone(device));
        }
        let reading = device.map(|d| d.is_on());
        self.update(|t| t.observe(reading))
    }

    // ── Private helpers ──────────────────────────────────────────

    fn tracker(&self) -> MutexGuard<'_, RelayTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the tracker and publish the resulting state.
    fn update<R>(&self, f: impl FnOnce(&mut RelayTracker) -> R) -> R {
        let (result, state) = {
            let mut tracker = self.tracker();
            let result = f(&mut tracker);
            (result, tracker.state())
        };
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        result
    }

    fn not_found(&self) -> CoreError {
        CoreError::DeviceNotFound {
            device_id: self.device_id.clone(),
        }
    }
}
