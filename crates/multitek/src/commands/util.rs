//! Shared helpers for command handlers.

use std::sync::Arc;

use multitek_core::{Coordinator, DeviceId, EntityManager, RelayEntity, TabletInfo};

use crate::config::Resolved;
use crate::error::CliError;

/// Build a coordinator for the resolved tablet, poll once, and attach
/// entities to the result.
pub async fn connect(resolved: &Resolved) -> Result<(Coordinator, EntityManager), CliError> {
    let coordinator = Coordinator::for_tablet(&resolved.tablet, resolved.coordinator.clone())?;
    coordinator.refresh_now().await?;
    let manager = attach(&coordinator, resolved);
    Ok((coordinator, manager))
}

/// Attach an entity manager keyed by the tablet's `host:port` identity.
pub fn attach(coordinator: &Coordinator, resolved: &Resolved) -> EntityManager {
    EntityManager::attach(
        coordinator,
        resolved.tablet.identifier(),
        TabletInfo::from(&resolved.tablet),
    )
}

/// Look up a device entity by its tablet ID.
pub fn find_entity(manager: &EntityManager, identifier: &str) -> Result<Arc<RelayEntity>, CliError> {
    manager
        .get(&DeviceId::from(identifier))
        .ok_or_else(|| CliError::NotFound {
            identifier: identifier.into(),
        })
}
