// ── Entity registry ──
//
// Keeps one `RelayEntity` per device the tablet has ever listed and routes
// coordinator updates to them. Devices that appear in later polls get new
// entities on the fly.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::coordinator::{Coordinator, CoordinatorUpdate, SubscriptionHandle};
use crate::model::{ConnectionStatus, Device, DeviceId};

use super::info::TabletInfo;
use super::relay::RelayEntity;
use super::relay_state::RelayState;
use super::sensor::{ConnectionStatusSensor, DeviceCountSensor};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Change notifications for host-side rendering.
#[derive(Debug, Clone)]
pub enum EntityEvent {
    /// A device appeared for the first time.
    Added(Arc<RelayEntity>),
    /// Displayed state or availability of an entity changed.
    Updated {
        unique_id: String,
        state: RelayState,
        available: bool,
    },
}

/// Owns the entities of one tablet.
///
/// Cheaply cloneable. The coordinator only holds a weak reference back,
/// so dropping every `EntityManager` clone ends routing.
#[derive(Clone)]
pub struct EntityManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    coordinator: Coordinator,
    entry_id: String,
    tablet: Arc<TabletInfo>,
    entities: DashMap<DeviceId, Arc<RelayEntity>>,
    events: broadcast::Sender<EntityEvent>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    last_status: Mutex<ConnectionStatus>,
}

impl EntityManager {
    /// Create entities for the devices already in the snapshot and start
    /// following coordinator updates.
    pub fn attach(coordinator: &Coordinator, entry_id: impl Into<String>, tablet: TabletInfo) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let inner = Arc::new(ManagerInner {
            coordinator: coordinator.clone(),
            entry_id: entry_id.into(),
            tablet: Arc::new(tablet),
            entities: DashMap::new(),
            events,
            subscription: Mutex::new(None),
            last_status: Mutex::new(coordinator.connection_status()),
        });

        for device in coordinator.current_snapshot().iter() {
            inner.add_entity(device);
        }

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let handle = coordinator.subscribe(move |update| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(update);
            }
        });
        *inner.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Self { inner }
    }

    /// Stop following coordinator updates. Entities keep their last state.
    pub fn detach(&self) {
        let handle = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.inner.coordinator.unsubscribe(handle);
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.inner.entry_id
    }

    pub fn tablet(&self) -> &TabletInfo {
        &self.inner.tablet
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<RelayEntity>> {
        self.inner.entities.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Every entity, in the tablet's current listing order. Devices that
    /// have disappeared come last, ordered by id.
    pub fn entities(&self) -> Vec<Arc<RelayEntity>> {
        let snapshot = self.inner.coordinator.current_snapshot();
        let mut listed: Vec<Arc<RelayEntity>> = snapshot
            .ids()
            .filter_map(|id| self.get(id))
            .collect();

        let mut missing: Vec<Arc<RelayEntity>> = self
            .inner
            .entities
            .iter()
            .filter(|r| !snapshot.contains(r.key()))
            .map(|r| Arc::clone(r.value()))
            .collect();
        missing.sort_by(|a, b| a.device_id().cmp(b.device_id()));

        listed.append(&mut missing);
        listed
    }

    pub fn len(&self) -> usize {
        self.inner.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entities.is_empty()
    }

    pub fn device_count_sensor(&self) -> DeviceCountSensor {
        DeviceCountSensor::new(
            self.inner.coordinator.clone(),
            &self.inner.entry_id,
            Arc::clone(&self.inner.tablet),
        )
    }

    pub fn connection_status_sensor(&self) -> ConnectionStatusSensor {
        ConnectionStatusSensor::new(
            self.inner.coordinator.clone(),
            &self.inner.entry_id,
            Arc::clone(&self.inner.tablet),
        )
    }

    /// Subscribe to entity additions and state changes.
    pub fn events(&self) -> broadcast::Receiver<EntityEvent> {
        self.inner.events.subscribe()
    }
}

impl ManagerInner {
    fn add_entity(&self, device: &Arc<Device>) -> Arc<RelayEntity> {
        let entity = Arc::new(RelayEntity::new(
            self.coordinator.clone(),
            &self.entry_id,
            Arc::clone(&self.tablet),
            Arc::clone(device),
        ));
        self.entities.insert(device.id().clone(), Arc::clone(&entity));
        entity
    }

    fn apply(&self, update: &CoordinatorUpdate) {
        let status = update.poll_state.status;
        let status_changed = {
            let mut last = self.last_status.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = last.is_connected() != status.is_connected();
            *last = status;
            changed
        };

        // Failed polls leave entity state alone; only availability moves.
        if !status.is_connected() {
            if status_changed {
                self.broadcast_all();
            }
            return;
        }

        for device in update.snapshot.iter() {
            if self.entities.contains_key(device.id()) {
                continue;
            }
            let entity = self.add_entity(device);
            info!(entity = %entity.unique_id(), name = %entity.name(), "new device discovered");
            let _ = self.events.send(EntityEvent::Added(entity));
        }

        for entry in &self.entities {
            let entity = entry.value();
            let changed = entity.observe(update.snapshot.get(entry.key()));
            if changed || status_changed {
                self.broadcast(entity);
            }
        }

        if !update.diff.removed.is_empty() {
            debug!(removed = update.diff.removed.len(), "devices missing from poll marked unknown");
        }
    }

    fn broadcast_all(&self) {
        for entry in &self.entities {
            self.broadcast(entry.value());
        }
    }

    fn broadcast(&self, entity: &RelayEntity) {
        let _ = self.events.send(EntityEvent::Updated {
            unique_id: entity.unique_id().to_owned(),
            state: entity.state(),
            available: entity.available(),
        });
    }
}
