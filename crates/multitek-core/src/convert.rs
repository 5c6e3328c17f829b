// ── API-to-domain type conversions ──
//
// Bridges raw `multitek_api` records into `multitek_core::model` types,
// filling the display name fallback and clamping shutter positions.

use chrono::{DateTime, Utc};

use multitek_api::RawDevice;

use crate::model::{Device, DeviceDescriptor, DeviceId, DeviceKind, DeviceState};

/// Blank strings from the tablet mean "not set".
fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

impl From<RawDevice> for DeviceDescriptor {
    fn from(raw: RawDevice) -> Self {
        let kind = DeviceKind::from_code(raw.relay_type);
        let name = non_empty(raw.name).unwrap_or_else(|| format!("Relay {}", raw.id));
        // Only keep the tablet's label when it says something our kind name does not.
        let type_name = non_empty(raw.type_name).filter(|t| t != kind.display_name());

        Self {
            id: DeviceId::from(raw.id),
            kind,
            name,
            room: non_empty(raw.room),
            flat: non_empty(raw.flat),
            type_name,
            favourite: raw.favourite,
            reverse_contact: raw.reverse_contact,
        }
    }
}

/// Convert one polled record, stamping it with the poll time.
pub(crate) fn device_from_raw(raw: RawDevice, seen: DateTime<Utc>) -> Device {
    let on = raw.state;
    let position = raw.position.map(|p| p.min(100));
    Device {
        descriptor: DeviceDescriptor::from(raw),
        state: DeviceState {
            on,
            position,
            last_seen: seen,
        },
    }
}
