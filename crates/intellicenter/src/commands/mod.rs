//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod equipment;
pub mod info;
pub mod objects;
pub mod set;
pub mod watch;

use intellicenter_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
///
/// `watch` owns its connection lifecycle; every other command runs inside
/// a single connect / disconnect pair.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(controller, args, global).await,
        cmd => {
            controller.connect().await?;
            let result = run(cmd, controller, global).await;
            controller.disconnect().await;
            result
        }
    }
}

async fn run(cmd: Command, controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::handle(controller, global).await,
        Command::Objects(args) => objects::handle(controller, args, global),
        Command::Set(args) => set::handle_set(controller, args, global).await,
        Command::On { objnam } => set::handle_switch(controller, objnam, true, global).await,
        Command::Off { objnam } => set::handle_switch(controller, objnam, false, global).await,
        Command::Valve { valve, state } => {
            set::handle_valve(controller, valve, state.is_on(), global).await
        }
        Command::Vacation { state } => set::handle_vacation(controller, state.is_on(), global).await,
        Command::Setpoint(args) => equipment::handle_setpoint(controller, args, global).await,
        Command::Heater(args) => equipment::handle_heater(controller, args, global).await,
        Command::Chem(args) => equipment::handle_chem(controller, args, global).await,
        Command::Light(args) => equipment::handle_light(controller, args, global).await,
        // Config, Completions and Watch are handled before dispatch
        Command::Config(_) | Command::Completions(_) | Command::Watch(_) => Err(
            CliError::Internal("command does not use a controller session".into()),
        ),
    }
}
