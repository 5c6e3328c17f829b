//! `status`: probe the tablet without starting a coordinator.

use serde::Serialize;

use multitek_core::TabletInfo;

use crate::cli::GlobalOpts;
use crate::config::Resolved;
use crate::error::{self, CliError};
use crate::output;

#[derive(Debug, Serialize)]
struct StatusView {
    identifier: String,
    name: String,
    manufacturer: &'static str,
    model: String,
    online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    /// `None` when the tablet has no discovery endpoint.
    auth_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_count: Option<u32>,
    configuration_url: String,
}

fn detail(s: &StatusView) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut lines = vec![
        format!("Tablet:        {}", s.name),
        format!("Address:       {}", s.identifier),
        format!("Model:         {} {}", s.manufacturer, s.model),
        format!("Online:        {}", yes_no(s.online)),
    ];
    if let Some(ref v) = s.firmware {
        lines.push(format!("Firmware:      {v}"));
    }
    if let Some(ref v) = s.api_version {
        lines.push(format!("API version:   {v}"));
    }
    lines.push(format!(
        "Auth required: {}",
        s.auth_required.map_or("unknown", yes_no)
    ));
    if let Some(n) = s.device_count {
        lines.push(format!("Devices:       {n}"));
    }
    lines.push(format!("Web UI:        {}", s.configuration_url));
    lines.join("\n")
}

pub async fn handle(resolved: &Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let timeout_secs = resolved.tablet.timeout.as_secs();
    let client = resolved.tablet.client()?;

    let status = client
        .status()
        .await
        .map_err(|e| error::from_api(e, timeout_secs))?;

    // Older firmware has no discovery document.
    let discovery = match client.discover().await {
        Ok(d) => Some(d),
        Err(e) if e.status() == Some(404) => {
            tracing::debug!("tablet has no discovery endpoint");
            None
        }
        Err(e) => return Err(error::from_api(e, timeout_secs)),
    };

    let info = TabletInfo::from(&resolved.tablet);
    let view = StatusView {
        identifier: info.identifier,
        name: discovery
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or(info.name),
        manufacturer: info.manufacturer,
        model: discovery
            .as_ref()
            .and_then(|d| d.model.clone())
            .unwrap_or_else(|| info.model.to_owned()),
        online: status.online,
        firmware: status.version,
        api_version: discovery.as_ref().and_then(|d| d.api.version.clone()),
        auth_required: discovery.as_ref().map(|d| d.api.auth_required),
        device_count: status.device_count,
        configuration_url: info.configuration_url,
    };

    let out = output::render_single(&global.output, &view, detail, |s| s.identifier.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}
