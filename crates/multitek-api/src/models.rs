// Wire types for the tablet's JSON API.
//
// Field names follow the tablet firmware. Everything beyond `id` is
// optional or defaulted, since older firmware omits several fields.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Relay type code for a generic on/off switch, used when `type` is missing.
pub const RELAY_TYPE_ON_OFF: u8 = 3;

/// `GET /api/status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabletStatus {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub device_count: Option<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// API capability block inside the discovery document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// `GET /api/discover` response: the tablet describing itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api: ApiInfo,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Envelope of `GET /api/devices`.
///
/// Records stay as raw JSON here so one unreadable entry can be dropped
/// without losing the rest of the list.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Vec<serde_json::Value>,
}

/// One relay/device record as reported by the tablet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDevice {
    #[serde(deserialize_with = "id_from_string_or_int")]
    pub id: String,
    #[serde(
        rename = "type",
        default = "default_relay_type",
        deserialize_with = "lenient_relay_type"
    )]
    pub relay_type: u8,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "room_name")]
    pub room: Option<String>,
    #[serde(default, alias = "flat_name")]
    pub flat: Option<String>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub flat_id: Option<i64>,
    #[serde(default)]
    pub state: bool,
    #[serde(default, deserialize_with = "lenient_position")]
    pub position: Option<u8>,
    #[serde(default)]
    pub favourite: bool,
    #[serde(default)]
    pub reverse_contact: bool,
}

fn default_relay_type() -> u8 {
    RELAY_TYPE_ON_OFF
}

/// Codes outside `u8`, or non-numeric codes, read as a plain switch.
fn lenient_relay_type<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let code = Option::<serde_json::Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|c| u8::try_from(c).ok());
    Ok(code.unwrap_or(RELAY_TYPE_ON_OFF))
}

/// Shutter position as a percentage. Out-of-range numbers are clamped to
/// 0..=100; anything that is not a number means "no position".
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_position<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let position = Option::<serde_json::Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u8);
    Ok(position)
}

/// Response to a relay write (`state` or `toggle`).
///
/// The tablet echoes the relay's new state when it knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body the tablet sends alongside non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

/// Body of `POST /api/relay/{id}/state`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SetStateBody {
    pub state: bool,
}

/// Device ids arrive as JSON integers from current firmware and as strings
/// from older builds; both normalise to a string.
fn id_from_string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a device id as string or integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
