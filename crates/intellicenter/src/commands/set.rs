//! Attribute writes, on/off switching, valves and vacation mode.

use intellicenter_core::{Attributes, Command as CoreCommand, Controller, OptimisticValue};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle_set(controller: &Controller, args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let changes: Attributes = args.changes.into_iter().collect();
    let summary = changes
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");

    controller
        .execute(
            CoreCommand::SetAttributes {
                objnam: args.objnam.clone(),
                changes,
            },
            true,
        )
        .await?;

    output::print_output(&format!("{}: {summary}", args.objnam), global.quiet);
    Ok(())
}

pub async fn handle_switch(
    controller: &Controller,
    objnam: String,
    on: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let cmd = if on {
        CoreCommand::TurnOn {
            objnam: objnam.clone(),
        }
    } else {
        CoreCommand::TurnOff {
            objnam: objnam.clone(),
        }
    };
    let before = controller.model().get(&objnam).cloned();
    controller.execute(cmd, true).await?;

    let Some(before) = before else {
        output::print_output(&format!("{objnam}: {}", on_off(on)), global.quiet);
        return Ok(());
    };
    let after = controller.model().get(&objnam).cloned();
    let state = settle(
        before.status(),
        after.as_deref().and_then(|obj| obj.status()),
        before.on_status(),
        on,
    );

    let pending = if state.is_pending() { " (pending)" } else { "" };
    output::print_output(
        &format!("{objnam}: {}{pending}", on_off(*state.value())),
        global.quiet,
    );
    Ok(())
}

/// State to report once a switch request is acknowledged. The requested
/// state stands until the controller reports a `STATUS` other than the one
/// seen before the request.
fn settle(
    before: Option<&str>,
    after: Option<&str>,
    on_status: &str,
    requested: bool,
) -> OptimisticValue<bool> {
    let mut state = OptimisticValue::new(before == Some(on_status));
    state.request(requested);
    if after != before {
        state.confirm(after == Some(on_status));
    }
    state
}

pub async fn handle_valve(
    controller: &Controller,
    valve: String,
    on: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    controller
        .execute(
            CoreCommand::SetValveState {
                objnam: valve.clone(),
                on,
            },
            true,
        )
        .await?;

    output::print_output(&format!("{valve}: {}", on_off(on)), global.quiet);
    Ok(())
}

pub async fn handle_vacation(controller: &Controller, on: bool, global: &GlobalOpts) -> Result<(), CliError> {
    controller
        .execute(CoreCommand::SetVacationMode { on }, true)
        .await?;

    output::print_output(&format!("vacation mode: {}", on_off(on)), global.quiet);
    Ok(())
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
