//! Heating, chemistry and light handlers.

use serde::Serialize;
use tabled::Tabled;

use intellicenter_core::{Command as CoreCommand, Controller, LIGHT_EFFECTS};

use crate::cli::{ChemArgs, ChemCommand, GlobalOpts, HeaterArgs, LightArgs, LightCommand, SetpointArgs};
use crate::error::CliError;
use crate::output;

// ── Heating ──────────────────────────────────────────────────────────

pub async fn handle_setpoint(
    controller: &Controller,
    args: SetpointArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (cmd, label) = if args.max {
        (
            CoreCommand::SetMaxSetpoint {
                body: args.body.clone(),
                temperature: args.temperature,
            },
            "max setpoint",
        )
    } else {
        (
            CoreCommand::SetSetpoint {
                body: args.body.clone(),
                temperature: args.temperature,
            },
            "setpoint",
        )
    };
    controller.execute(cmd, true).await?;

    let unit = match controller.system_info() {
        Some(info) if info.uses_metric => "°C",
        _ => "°F",
    };
    output::print_output(
        &format!("{}: {label} {}{unit}", args.body, args.temperature),
        global.quiet,
    );
    Ok(())
}

pub async fn handle_heater(
    controller: &Controller,
    args: HeaterArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (cmd, message) = match args.heater {
        Some(heater) if !args.clear => (
            CoreCommand::SetHeater {
                body: args.body.clone(),
                heater: heater.clone(),
            },
            format!("{}: heater {heater}", args.body),
        ),
        _ => (
            CoreCommand::ClearHeater {
                body: args.body.clone(),
            },
            format!("{}: heater cleared", args.body),
        ),
    };
    controller.execute(cmd, true).await?;

    output::print_output(&message, global.quiet);
    Ok(())
}

// ── Chemistry ────────────────────────────────────────────────────────

pub async fn handle_chem(controller: &Controller, args: ChemArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (cmd, message) = match args.command {
        ChemCommand::Ph { chem, value } => (
            CoreCommand::SetPhSetpoint {
                chem: chem.clone(),
                ph: value,
            },
            format!("{chem}: pH setpoint {value:.1}"),
        ),
        ChemCommand::Orp { chem, millivolts } => (
            CoreCommand::SetOrpSetpoint {
                chem: chem.clone(),
                millivolts,
            },
            format!("{chem}: ORP setpoint {millivolts} mV"),
        ),
        ChemCommand::Chlorinator {
            chem,
            primary,
            secondary,
        } => {
            let message = match secondary {
                Some(sec) => format!("{chem}: chlorinator {primary}% / {sec}%"),
                None => format!("{chem}: chlorinator {primary}%"),
            };
            (
                CoreCommand::SetChlorinatorOutput {
                    chem,
                    primary,
                    secondary,
                },
                message,
            )
        }
        ChemCommand::Alkalinity { chem, ppm } => (
            CoreCommand::SetAlkalinity {
                chem: chem.clone(),
                ppm,
            },
            format!("{chem}: alkalinity {ppm} ppm"),
        ),
        ChemCommand::Calcium { chem, ppm } => (
            CoreCommand::SetCalciumHardness {
                chem: chem.clone(),
                ppm,
            },
            format!("{chem}: calcium hardness {ppm} ppm"),
        ),
        ChemCommand::Cyanuric { chem, ppm } => (
            CoreCommand::SetCyanuricAcid {
                chem: chem.clone(),
                ppm,
            },
            format!("{chem}: cyanuric acid {ppm} ppm"),
        ),
    };
    controller.execute(cmd, true).await?;

    output::print_output(&message, global.quiet);
    Ok(())
}

// ── Lights ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Effect {
    code: &'static str,
    name: &'static str,
}

#[derive(Tabled)]
struct EffectRow {
    #[tabled(rename = "Code")]
    code: &'static str,
    #[tabled(rename = "Effect")]
    name: &'static str,
}

pub async fn handle_light(controller: &Controller, args: LightArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        LightCommand::Effect { circuit, effect } => {
            let effect = effect.to_ascii_uppercase();
            controller
                .execute(
                    CoreCommand::SetLightEffect {
                        objnam: circuit.clone(),
                        effect: effect.clone(),
                    },
                    true,
                )
                .await?;
            output::print_output(&format!("{circuit}: effect {effect}"), global.quiet);
            Ok(())
        }
        LightCommand::Effects => list_effects(global),
    }
}

/// Print the known effect codes; needs no controller.
pub fn list_effects(global: &GlobalOpts) -> Result<(), CliError> {
    let effects: Vec<Effect> = LIGHT_EFFECTS
        .iter()
        .map(|&(code, name)| Effect { code, name })
        .collect();
    let out = output::render_list(
        &global.output,
        &effects,
        |e| EffectRow {
            code: e.code,
            name: e.name,
        },
        |e| e.code.to_owned(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
