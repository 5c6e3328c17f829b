// ── Device domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoStaticStr};

/// Stable identifier of a relay, scoped to one tablet.
///
/// The tablet sends ids as integers or strings; both are carried as the
/// decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of relay, keyed by the tablet's numeric `type` code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Shutter,
    Switch,
    GasValve,
    ElectricSwitch,
    WaterValve,
}

impl DeviceKind {
    /// Map a tablet relay code. Unknown codes are treated as plain switches.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Light,
            2 => Self::Shutter,
            4 => Self::GasValve,
            5 => Self::ElectricSwitch,
            6 => Self::WaterValve,
            _ => Self::Switch,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Light => 1,
            Self::Shutter => 2,
            Self::Switch => 3,
            Self::GasValve => 4,
            Self::ElectricSwitch => 5,
            Self::WaterValve => 6,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Shutter => "Shutter",
            Self::Switch => "Switch",
            Self::GasValve => "Gas Valve",
            Self::ElectricSwitch => "Electric Switch",
            Self::WaterValve => "Water Valve",
        }
    }

    /// Default icon hint for the host platform.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Light => "mdi:lightbulb",
            Self::Shutter => "mdi:window-shutter",
            Self::Switch => "mdi:toggle-switch",
            Self::GasValve => "mdi:gas-cylinder",
            Self::ElectricSwitch => "mdi:flash",
            Self::WaterValve => "mdi:water",
        }
    }

    /// Host platform an entity of this kind is registered under.
    pub fn platform(self) -> Platform {
        match self {
            Self::Shutter => Platform::Cover,
            _ => Platform::Switch,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Host platform for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Switch,
    Cover,
}

/// Immutable metadata describing a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub name: String,
    pub room: Option<String>,
    pub flat: Option<String>,
    /// Type label as reported by the tablet, when it differs from ours.
    pub type_name: Option<String>,
    pub favourite: bool,
    pub reverse_contact: bool,
}

/// Last reported reading of a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// On for switches and lights, open for shutters and valves.
    pub on: bool,
    /// Position 0–100, shutters only.
    pub position: Option<u8>,
    /// Time of the poll that reported this reading.
    pub last_seen: DateTime<Utc>,
}

impl DeviceState {
    /// Same reading, ignoring when it was observed.
    pub fn same_reading(&self, other: &Self) -> bool {
        self.on == other.on && self.position == other.position
    }
}

/// A relay: its descriptor paired with its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    pub state: DeviceState,
}

impl Device {
    pub fn id(&self) -> &DeviceId {
        &self.descriptor.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.descriptor.kind
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_on(&self) -> bool {
        self.state.on
    }

    /// Whether `other` differs in metadata or reading. `last_seen` is ignored.
    pub fn differs_from(&self, other: &Self) -> bool {
        self.descriptor != other.descriptor || !self.state.same_reading(&other.state)
    }
}
