//! Command dispatch: bridges CLI args -> core sessions -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod joystick;
pub mod status;
pub mod util;
pub mod watch;

use ptzlink_core::PtzClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &PtzClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(client, args, global).await,
        Command::Move(args) => control::move_gesture(client, args, global).await,
        Command::Zoom(args) => control::zoom(client, args, global).await,
        Command::Stop(args) => control::stop(client, args, global).await,
        Command::Preset(args) => control::preset(client, args, global).await,
        Command::Patrol(args) => control::patrol(client, args, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        Command::Joystick(args) => joystick::handle(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config commands do not open a session".into(),
        )),
    }
}
