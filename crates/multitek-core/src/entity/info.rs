// ── Device registry info ──

use serde::Serialize;

use crate::config::TabletConfig;

/// How the tablet itself appears in the host platform's device registry.
///
/// Every entity of one tablet points at the same `TabletInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabletInfo {
    /// `"{host}:{port}"`.
    pub identifier: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub configuration_url: String,
}

impl TabletInfo {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            identifier: format!("{host}:{port}"),
            host: host.to_owned(),
            port,
            name: format!("Multitek Tablet {host}"),
            manufacturer: "Multitek",
            model: "Smart Tablet",
            configuration_url: format!("http://{host}:{port}"),
        }
    }
}

impl From<&TabletConfig> for TabletInfo {
    fn from(tablet: &TabletConfig) -> Self {
        let mut info = Self::new(&tablet.host, tablet.port);
        if tablet.https {
            info.configuration_url = format!("https://{}", info.identifier);
        }
        info
    }
}
