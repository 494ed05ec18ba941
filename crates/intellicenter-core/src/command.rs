// ── Command API ──
//
// All write operations flow through a unified `Command` enum. Each variant
// is validated against the current model and resolved into one
// `SetParamList` change set: the target object name plus the attributes
// to write, already encoded the way the controller expects (integers
// without decimals, pH with exactly one).

use crate::error::CoreError;
use crate::model::attributes::{
    ACT, ALK, CALC, CYACID, HEATER, HITMP, LOTMP, ORPSET, PHSET, PRIM, SEC, STATUS, VACFLO,
};
use crate::model::{Attributes, NULL_OBJNAM, ObjectType, PoolModel, PoolObject};

/// Color effect codes accepted by IntelliBrite-style lights, with display names.
pub const LIGHT_EFFECTS: &[(&str, &str)] = &[
    ("PARTY", "Party Mode"),
    ("CARIB", "Caribbean"),
    ("SSET", "Sunset"),
    ("ROMAN", "Romance"),
    ("AMERCA", "American"),
    ("ROYAL", "Royal"),
    ("WHITER", "White"),
    ("REDR", "Red"),
    ("BLUER", "Blue"),
    ("GREENR", "Green"),
    ("MAGNTAR", "Magenta"),
];

/// Accepted pH setpoints, in tenths.
const PH_TENTHS: std::ops::RangeInclusive<i64> = 70..=76;
const ORP_RANGE: std::ops::RangeInclusive<u32> = 400..=800;
const CHLORINATOR_RANGE: std::ops::RangeInclusive<u8> = 0..=100;
const ALKALINITY_RANGE: std::ops::RangeInclusive<u32> = 0..=800;
const CALCIUM_RANGE: std::ops::RangeInclusive<u32> = 0..=800;
const CYANURIC_RANGE: std::ops::RangeInclusive<u32> = 0..=201;

/// All write operations against an IntelliCenter controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Circuits, pumps, bodies ──────────────────────────────────────
    TurnOn { objnam: String },
    TurnOff { objnam: String },
    SetLightEffect { objnam: String, effect: String },
    SetValveState { objnam: String, on: bool },

    // ── Heating ──────────────────────────────────────────────────────
    SetSetpoint { body: String, temperature: i32 },
    SetMaxSetpoint { body: String, temperature: i32 },
    SetHeater { body: String, heater: String },
    ClearHeater { body: String },

    // ── Chemistry ────────────────────────────────────────────────────
    SetPhSetpoint { chem: String, ph: f64 },
    SetOrpSetpoint { chem: String, millivolts: u32 },
    SetChlorinatorOutput {
        chem: String,
        primary: u8,
        secondary: Option<u8>,
    },
    SetAlkalinity { chem: String, ppm: u32 },
    SetCalciumHardness { chem: String, ppm: u32 },
    SetCyanuricAcid { chem: String, ppm: u32 },

    // ── System ───────────────────────────────────────────────────────
    SetVacationMode { on: bool },

    /// Raw attribute writes; only checks that the object exists.
    SetAttributes { objnam: String, changes: Attributes },
}

/// A validated change set ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    pub objnam: String,
    pub changes: Attributes,
}

impl Command {
    /// Validate against `model` and build the attribute writes.
    ///
    /// `system_objnam` is used for system-wide settings when the model has
    /// no `SYSTEM` object.
    pub fn resolve(
        &self,
        model: &PoolModel,
        system_objnam: Option<&str>,
    ) -> Result<ChangeRequest, CoreError> {
        match self {
            Command::TurnOn { objnam } => {
                let obj = lookup(model, objnam)?;
                Ok(request(objnam, [(STATUS, obj.on_status().to_owned())]))
            }
            Command::TurnOff { objnam } => {
                let obj = lookup(model, objnam)?;
                Ok(request(objnam, [(STATUS, obj.off_status().to_owned())]))
            }
            Command::SetLightEffect { objnam, effect } => {
                let obj = lookup(model, objnam)?;
                if !obj.is_a_light() && !obj.is_a_light_show() {
                    return Err(CoreError::validation(format!("{objnam} is not a light")));
                }
                if !LIGHT_EFFECTS.iter().any(|(code, _)| *code == effect.as_str()) {
                    return Err(CoreError::validation(format!(
                        "unknown light effect '{effect}'"
                    )));
                }
                Ok(request(
                    objnam,
                    [(STATUS, obj.on_status().to_owned()), (ACT, effect.clone())],
                ))
            }
            Command::SetValveState { objnam, on } => {
                expect_type(model, objnam, &ObjectType::Valve)?;
                Ok(request(objnam, [(STATUS, on_off(*on))]))
            }

            Command::SetSetpoint { body, temperature } => {
                expect_type(model, body, &ObjectType::Body)?;
                Ok(request(body, [(LOTMP, temperature.to_string())]))
            }
            Command::SetMaxSetpoint { body, temperature } => {
                expect_type(model, body, &ObjectType::Body)?;
                Ok(request(body, [(HITMP, temperature.to_string())]))
            }
            Command::SetHeater { body, heater } => {
                expect_type(model, body, &ObjectType::Body)?;
                lookup(model, heater)?;
                Ok(request(body, [(HEATER, heater.clone())]))
            }
            Command::ClearHeater { body } => {
                expect_type(model, body, &ObjectType::Body)?;
                Ok(request(body, [(HEATER, NULL_OBJNAM.to_owned())]))
            }

            Command::SetPhSetpoint { chem, ph } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                Ok(request(chem, [(PHSET, encode_ph(*ph)?)]))
            }
            Command::SetOrpSetpoint { chem, millivolts } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                check_range("ORP setpoint", *millivolts, &ORP_RANGE)?;
                Ok(request(chem, [(ORPSET, millivolts.to_string())]))
            }
            Command::SetChlorinatorOutput {
                chem,
                primary,
                secondary,
            } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                check_range("chlorinator output", *primary, &CHLORINATOR_RANGE)?;
                let mut changes = Attributes::from([(PRIM.to_owned(), primary.to_string())]);
                if let Some(secondary) = secondary {
                    check_range("chlorinator output", *secondary, &CHLORINATOR_RANGE)?;
                    changes.insert(SEC.to_owned(), secondary.to_string());
                }
                Ok(ChangeRequest {
                    objnam: chem.clone(),
                    changes,
                })
            }
            Command::SetAlkalinity { chem, ppm } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                check_range("alkalinity", *ppm, &ALKALINITY_RANGE)?;
                Ok(request(chem, [(ALK, ppm.to_string())]))
            }
            Command::SetCalciumHardness { chem, ppm } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                check_range("calcium hardness", *ppm, &CALCIUM_RANGE)?;
                Ok(request(chem, [(CALC, ppm.to_string())]))
            }
            Command::SetCyanuricAcid { chem, ppm } => {
                expect_type(model, chem, &ObjectType::Chem)?;
                check_range("cyanuric acid", *ppm, &CYANURIC_RANGE)?;
                Ok(request(chem, [(CYACID, ppm.to_string())]))
            }

            Command::SetVacationMode { on } => {
                let objnam = model
                    .system_object()
                    .map(|obj| obj.objnam())
                    .or(system_objnam)
                    .ok_or(CoreError::NotConnected)?;
                Ok(request(objnam, [(VACFLO, on_off(*on))]))
            }

            Command::SetAttributes { objnam, changes } => {
                lookup(model, objnam)?;
                if changes.is_empty() {
                    return Err(CoreError::validation("no attributes to change"));
                }
                Ok(ChangeRequest {
                    objnam: objnam.clone(),
                    changes: changes.clone(),
                })
            }
        }
    }
}

// ── Readers ──────────────────────────────────────────────────────────

/// Primary and secondary chlorinator output percentages.
pub fn chlorinator_output(model: &PoolModel, chem: &str) -> Option<(u8, u8)> {
    let obj = model.get(chem)?;
    let primary = obj.get(PRIM)?.parse().ok()?;
    let secondary = obj.get(SEC).and_then(|s| s.parse().ok()).unwrap_or(0);
    Some((primary, secondary))
}

/// `true` when the system object reports vacation mode on.
pub fn is_vacation_mode(model: &PoolModel) -> bool {
    model
        .system_object()
        .and_then(|obj| obj.get(VACFLO))
        .is_some_and(|v| v == "ON")
}

// ── Helpers ──────────────────────────────────────────────────────────

fn request<const N: usize>(objnam: &str, pairs: [(&str, String); N]) -> ChangeRequest {
    ChangeRequest {
        objnam: objnam.to_owned(),
        changes: pairs
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect(),
    }
}

fn lookup<'a>(model: &'a PoolModel, objnam: &str) -> Result<&'a PoolObject, CoreError> {
    model
        .get(objnam)
        .map(|obj| &**obj)
        .ok_or_else(|| CoreError::ObjectNotFound {
            objnam: objnam.to_owned(),
        })
}

fn expect_type<'a>(
    model: &'a PoolModel,
    objnam: &str,
    expected: &ObjectType,
) -> Result<&'a PoolObject, CoreError> {
    let obj = lookup(model, objnam)?;
    if obj.object_type() != expected {
        return Err(CoreError::WrongObjectType {
            objnam: objnam.to_owned(),
            expected: expected.to_string(),
            actual: obj.object_type().to_string(),
        });
    }
    Ok(obj)
}

fn check_range<T>(what: &str, value: T, range: &std::ops::RangeInclusive<T>) -> Result<(), CoreError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "{what} {value} out of range {}..={}",
            range.start(),
            range.end()
        )))
    }
}

/// pH is written with one decimal and must be a whole tenth in 7.0..=7.6.
fn encode_ph(ph: f64) -> Result<String, CoreError> {
    let scaled = ph * 10.0;
    let tenths = scaled.round();
    #[allow(clippy::cast_possible_truncation)]
    let whole = tenths as i64;
    if !ph.is_finite() || (scaled - tenths).abs() > 1e-6 || !PH_TENTHS.contains(&whole) {
        return Err(CoreError::validation(format!(
            "pH setpoint {ph} must be between 7.0 and 7.6 in steps of 0.1"
        )));
    }
    Ok(format!("{:.1}", tenths / 10.0))
}

fn on_off(on: bool) -> String {
    let value = if on { "ON" } else { "OFF" };
    value.to_owned()
}

// ── Tests ────────────────────────────────────────────────────────────
