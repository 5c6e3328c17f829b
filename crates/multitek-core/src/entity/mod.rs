// ── Entity adapters ──
//
// Host-facing objects built on top of the coordinator: one relay entity
// per device plus two tablet-level sensors.

mod info;
mod manager;
mod relay;
mod relay_state;
mod sensor;

pub use info::TabletInfo;
pub use manager::{EntityEvent, EntityManager};
pub use relay::{RelayAttributes, RelayEntity};
pub use relay_state::RelayState;
pub use sensor::{
    ConnectionStatusAttributes, ConnectionStatusSensor, DeviceCountAttributes, DeviceCountSensor,
};
