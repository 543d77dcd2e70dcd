//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod items;
pub mod watch;

use habflow_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Items(args) => items::list(controller, &args, global).await,
        Command::Get { item } => items::get(controller, &item, global).await,
        Command::Send {
            item,
            command,
            if_changed,
        } => control::send(controller, &item, &command, if_changed, global).await,
        Command::Update {
            item,
            state,
            if_changed,
        } => control::update(controller, &item, &state, if_changed, global).await,
        Command::Watch(args) => watch::watch(controller, args, global).await,
        Command::Events => watch::events(controller, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a controller".into(),
        )),
    }
}
