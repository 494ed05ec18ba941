// ── Attribute names and the default tracking map ──
//
// IntelliCenter identifies every property by a short upper-case key.
// Only the keys used by the model and the setters are named here; any
// other key the controller reports is stored as-is.

use std::collections::{BTreeMap, BTreeSet};

use super::ObjectType;

pub const ACT: &str = "ACT";
pub const ALK: &str = "ALK";
pub const BODY: &str = "BODY";
pub const CALC: &str = "CALC";
pub const CIRCUIT: &str = "CIRCUIT";
pub const CYACID: &str = "CYACID";
pub const FEATR: &str = "FEATR";
pub const FREEZE: &str = "FREEZE";
pub const GPM: &str = "GPM";
pub const HEATER: &str = "HEATER";
pub const HITMP: &str = "HITMP";
pub const HTMODE: &str = "HTMODE";
pub const LISTORD: &str = "LISTORD";
pub const LOTMP: &str = "LOTMP";
pub const LSTTMP: &str = "LSTTMP";
pub const MAX: &str = "MAX";
pub const MAXF: &str = "MAXF";
pub const MIN: &str = "MIN";
pub const MINF: &str = "MINF";
pub const MODE: &str = "MODE";
pub const OBJLIST: &str = "OBJLIST";
pub const OBJTYP: &str = "OBJTYP";
pub const ORPHI: &str = "ORPHI";
pub const ORPLO: &str = "ORPLO";
pub const ORPSET: &str = "ORPSET";
pub const ORPTNK: &str = "ORPTNK";
pub const ORPVAL: &str = "ORPVAL";
pub const PARENT: &str = "PARENT";
pub const PHHI: &str = "PHHI";
pub const PHLO: &str = "PHLO";
pub const PHSET: &str = "PHSET";
pub const PHTNK: &str = "PHTNK";
pub const PHVAL: &str = "PHVAL";
pub const PRIM: &str = "PRIM";
pub const PROPNAME: &str = "PROPNAME";
pub const PWR: &str = "PWR";
pub const QUALTY: &str = "QUALTY";
pub const RPM: &str = "RPM";
pub const SALT: &str = "SALT";
pub const SEC: &str = "SEC";
pub const SNAME: &str = "SNAME";
pub const SOURCE: &str = "SOURCE";
pub const STATUS: &str = "STATUS";
pub const SUBTYP: &str = "SUBTYP";
pub const SUPER: &str = "SUPER";
pub const TIME: &str = "TIME";
pub const USE: &str = "USE";
pub const VACFLO: &str = "VACFLO";
pub const VER: &str = "VER";
pub const VOL: &str = "VOL";

/// Object name meaning "no object", e.g. no heater assigned.
pub const NULL_OBJNAM: &str = "00000";

/// `STATUS` value the controller reports for a deleted object.
pub const STATUS_DESTROYED: &str = "DSTROY";

/// Object type → attributes the client subscribes to.
pub type AttributeMap = BTreeMap<ObjectType, BTreeSet<String>>;

/// The subscription set used unless the caller supplies its own.
pub fn default_attribute_map() -> AttributeMap {
    let table: [(ObjectType, &[&str]); 9] = [
        (
            ObjectType::Body,
            &[SNAME, HEATER, HITMP, HTMODE, LOTMP, LSTTMP, STATUS, VOL],
        ),
        (
            ObjectType::Circuit,
            &[SNAME, STATUS, USE, SUBTYP, FEATR, TIME, FREEZE],
        ),
        (ObjectType::CircuitGroup, &[CIRCUIT]),
        (
            ObjectType::Chem,
            &[
                SNAME, BODY, PRIM, SEC, SUPER, SUBTYP, PHVAL, ORPVAL, PHTNK, ORPTNK, QUALTY,
                PHSET, ORPSET, ALK, CALC, CYACID, PHHI, PHLO, ORPHI, ORPLO, SALT,
            ],
        ),
        (ObjectType::Heater, &[SNAME, BODY, LISTORD]),
        (
            ObjectType::Pump,
            &[SNAME, STATUS, PWR, RPM, GPM, MAX, MIN, MAXF, MINF],
        ),
        (ObjectType::Sense, &[SNAME, SOURCE]),
        (ObjectType::Schedule, &[SNAME, ACT, VACFLO]),
        (ObjectType::System, &[MODE, VACFLO, VER]),
    ];

    table
        .into_iter()
        .map(|(ty, keys)| (ty, keys.iter().map(|k| (*k).to_owned()).collect()))
        .collect()
}
