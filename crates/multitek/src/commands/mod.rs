//! Command dispatch: bridges CLI args -> coordinator / entities -> output.

pub mod config_cmd;
pub mod devices;
pub mod status;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a tablet-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(&resolved, global).await,
        Command::Devices(args) => devices::handle(&resolved, args, global).await,
        Command::Watch(args) => watch::handle(resolved, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
