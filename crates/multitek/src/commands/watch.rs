//! `watch`: run the coordinator and stream entity changes until Ctrl-C.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use multitek_core::{ConnectionStatus, Coordinator, EntityEvent, PollState, RelayState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::{self, Resolved};
use crate::error::CliError;
use crate::output;

use super::util;

/// One line of watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchLine {
    Added {
        id: String,
        name: String,
        state: RelayState,
    },
    Updated {
        id: String,
        name: String,
        state: RelayState,
        available: bool,
    },
    Status {
        status: ConnectionStatus,
        consecutive_failures: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        retry_in_secs: u64,
    },
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn print(&self, line: &WatchLine) {
        let out = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(line, true),
            OutputFormat::Yaml => format!("---\n{}", output::render_yaml(line)),
            OutputFormat::Table | OutputFormat::Plain => self.human(line),
        };
        output::print_output(&out, self.quiet);
    }

    fn human(&self, line: &WatchLine) -> String {
        let ts = chrono::Local::now().format("%H:%M:%S");
        match line {
            WatchLine::Added { id, name, state } => format!(
                "{ts}  + {name} ({id}) {}",
                output::paint_state(*state, self.color)
            ),
            WatchLine::Updated {
                id,
                name,
                state,
                available,
            } => {
                let suffix = if *available { "" } else { " (unavailable)" };
                format!(
                    "{ts}  ~ {name} ({id}) {}{suffix}",
                    output::paint_state(*state, self.color)
                )
            }
            WatchLine::Status {
                status,
                consecutive_failures,
                error,
                retry_in_secs,
            } => {
                let mut s = format!(
                    "{ts}  tablet {}",
                    output::paint_status(*status, self.color)
                );
                if let Some(err) = error {
                    let _ = write!(
                        s,
                        ": {err} (failures: {consecutive_failures}, retry in {retry_in_secs}s)"
                    );
                }
                s
            }
        }
    }
}

fn status_line(state: &PollState) -> WatchLine {
    WatchLine::Status {
        status: state.status,
        consecutive_failures: state.consecutive_failures,
        error: state.last_error.clone(),
        retry_in_secs: state.retry_delay.as_secs(),
    }
}

pub async fn handle(
    resolved: Resolved,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let coordinator_cfg = config::with_interval(resolved.coordinator.clone(), args.interval)?;
    let coordinator = Coordinator::for_tablet(&resolved.tablet, coordinator_cfg)?;
    let manager = util::attach(&coordinator, &resolved);

    let printer = Printer {
        format: global.output.clone(),
        color: output::should_color(&global.color),
        quiet: global.quiet,
    };
    let mut events = manager.events();
    let mut poll_states = coordinator.watch_poll_state();
    let mut names: HashMap<String, (String, String)> = HashMap::new();
    let mut last_status = ConnectionStatus::Pending;

    coordinator.start().await;
    if !global.quiet {
        eprintln!(
            "Watching {} every {}s (Ctrl-C to stop)",
            resolved.tablet.identifier(),
            coordinator.config().poll_interval.as_secs()
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(EntityEvent::Added(entity)) => {
                    let id = entity.device_id().to_string();
                    let name = entity.name();
                    names.insert(entity.unique_id().to_owned(), (id.clone(), name.clone()));
                    printer.print(&WatchLine::Added { id, name, state: entity.state() });
                }
                Ok(EntityEvent::Updated { unique_id, state, available }) => {
                    let (id, name) = names
                        .get(&unique_id)
                        .cloned()
                        .unwrap_or_else(|| (unique_id.clone(), unique_id.clone()));
                    printer.print(&WatchLine::Updated { id, name, state, available });
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch output fell behind, some changes were not printed");
                }
                Err(RecvError::Closed) => break,
            },
            Some(state) = poll_states.changed() => {
                // Print transitions and every failure; steady success is quiet.
                if state.status != last_status || !state.status.is_connected() {
                    printer.print(&status_line(&state));
                }
                last_status = state.status;
            }
        }
    }

    coordinator.stop().await;
    manager.detach();
    if !global.quiet {
        eprintln!("Stopped");
    }
    Ok(())
}
