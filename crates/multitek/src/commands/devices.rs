//! Device command handlers.

use serde::Serialize;
use tabled::Tabled;

use multitek_core::{RelayEntity, RelayState};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

/// Serializable view of one relay entity.
#[derive(Debug, Serialize)]
struct DeviceView {
    id: String,
    unique_id: String,
    name: String,
    kind: String,
    platform: String,
    device_type: String,
    room: String,
    flat: String,
    state: RelayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<u8>,
    favourite: bool,
    icon: &'static str,
}

impl From<&RelayEntity> for DeviceView {
    fn from(e: &RelayEntity) -> Self {
        let attrs = e.attributes();
        Self {
            id: e.device_id().to_string(),
            unique_id: e.unique_id().to_owned(),
            name: e.name(),
            kind: e.kind().to_string(),
            platform: e.platform().to_string(),
            device_type: attrs.device_type,
            room: attrs.room,
            flat: attrs.flat,
            state: e.state(),
            position: e.position(),
            favourite: attrs.favourite,
            icon: e.icon(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Flat")]
    flat: String,
    #[tabled(rename = "State")]
    state: String,
}

fn row(d: &DeviceView, color: bool) -> DeviceRow {
    DeviceRow {
        id: d.id.clone(),
        name: d.name.clone(),
        dtype: d.device_type.clone(),
        room: d.room.clone(),
        flat: d.flat.clone(),
        state: output::paint_state(d.state, color),
    }
}

fn detail(d: &DeviceView, color: bool) -> String {
    let or_dash = |s: &str| if s.is_empty() { "-".to_owned() } else { s.to_owned() };
    let mut lines = vec![
        format!("ID:        {}", d.id),
        format!("Name:      {}", d.name),
        format!("Type:      {}", d.device_type),
        format!("Platform:  {}", d.platform),
        format!("Room:      {}", or_dash(&d.room)),
        format!("Flat:      {}", or_dash(&d.flat)),
        format!("State:     {}", output::paint_state(d.state, color)),
    ];
    if let Some(pos) = d.position {
        lines.push(format!("Position:  {pos}%"));
    }
    lines.push(format!("Favourite: {}", if d.favourite { "yes" } else { "no" }));
    lines.push(format!("Entity:    {}", d.unique_id));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    resolved: &Resolved,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (_coordinator, manager) = util::connect(resolved).await?;
    let color = output::should_color(&global.color);

    match args.command {
        DevicesCommand::List => {
            let views: Vec<DeviceView> = manager
                .entities()
                .iter()
                .map(|e| DeviceView::from(e.as_ref()))
                .collect();
            let out = output::render_list(
                &global.output,
                &views,
                |d| row(d, color),
                |d| d.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { id } => {
            let entity = util::find_entity(&manager, &id)?;
            let view = DeviceView::from(entity.as_ref());
            let out = output::render_single(
                &global.output,
                &view,
                |d| detail(d, color),
                |d| d.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::On { id } => {
            let entity = util::find_entity(&manager, &id)?;
            entity.turn_on().await?;
            report(&entity, global, color);
            Ok(())
        }

        DevicesCommand::Off { id } => {
            let entity = util::find_entity(&manager, &id)?;
            entity.turn_off().await?;
            report(&entity, global, color);
            Ok(())
        }

        DevicesCommand::Toggle { id } => {
            let entity = util::find_entity(&manager, &id)?;
            entity.toggle().await?;
            report(&entity, global, color);
            Ok(())
        }
    }
}

/// Confirm a command on stderr; structured formats also get the new view.
fn report(entity: &RelayEntity, global: &GlobalOpts, color: bool) {
    if global.quiet {
        return;
    }
    let view = DeviceView::from(entity);
    eprintln!(
        "{} ({}) is now {}",
        view.name,
        view.id,
        output::paint_state(view.state, color)
    );
    if !matches!(global.output, crate::cli::OutputFormat::Table) {
        let out = output::render_single(&global.output, &view, |_| String::new(), |d| d.id.clone());
        output::print_output(&out, false);
    }
}
