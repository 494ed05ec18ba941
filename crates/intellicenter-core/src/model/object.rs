// ── Pool objects ──
//
// One equipment item (body, circuit, pump, heater, ...) as reported by the
// controller. The object name and type never change after creation; all
// other properties live in a flat string map that the model merges
// updates into.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use strum::EnumString;

use super::attributes::{FEATR, OBJTYP, PARENT, SNAME, STATUS, SUBTYP};

/// Attribute name → value.
pub type Attributes = BTreeMap<String, String>;

// ── ObjectType ───────────────────────────────────────────────────────

/// The `OBJTYP` tag of an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString)]
pub enum ObjectType {
    #[strum(serialize = "BODY")]
    Body,
    #[strum(serialize = "CHEM")]
    Chem,
    #[strum(serialize = "CIRCUIT")]
    Circuit,
    #[strum(serialize = "CIRCGRP")]
    CircuitGroup,
    #[strum(serialize = "HEATER")]
    Heater,
    #[strum(serialize = "MODULE")]
    Module,
    #[strum(serialize = "PANEL")]
    Panel,
    #[strum(serialize = "PUMP")]
    Pump,
    #[strum(serialize = "REMOTE")]
    Remote,
    #[strum(serialize = "SCHED")]
    Schedule,
    #[strum(serialize = "SENSE")]
    Sense,
    #[strum(serialize = "SYSTEM")]
    System,
    #[strum(serialize = "VALVE")]
    Valve,
    /// A type this library has no name for; kept verbatim.
    #[strum(default)]
    Other(String),
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Body => "BODY",
            Self::Chem => "CHEM",
            Self::Circuit => "CIRCUIT",
            Self::CircuitGroup => "CIRCGRP",
            Self::Heater => "HEATER",
            Self::Module => "MODULE",
            Self::Panel => "PANEL",
            Self::Pump => "PUMP",
            Self::Remote => "REMOTE",
            Self::Schedule => "SCHED",
            Self::Sense => "SENSE",
            Self::System => "SYSTEM",
            Self::Valve => "VALVE",
            Self::Other(tag) => tag,
        }
    }

    /// Parse a wire tag. Unknown tags become [`ObjectType::Other`].
    pub fn parse(tag: &str) -> Self {
        Self::from_str(tag).unwrap_or_else(|_| Self::Other(tag.to_owned()))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ── PoolObject ───────────────────────────────────────────────────────

const LIGHT_SUBTYPES: &[&str] = &[
    "LIGHT", "INTELLI", "GLOW", "GLOWT", "DIMMER", "MAGIC2", "CLRCASC", "PHOTON",
];
const LIGHT_SHOW_SUBTYPE: &str = "LITSHO";

/// A single piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolObject {
    objnam: String,
    #[serde(rename = "type")]
    object_type: ObjectType,
    attributes: Attributes,
}

impl PoolObject {
    /// Build an object from its full attribute set.
    ///
    /// `OBJTYP` is stored as the type and removed from the attribute map.
    pub fn new(objnam: impl Into<String>, object_type: ObjectType, mut attributes: Attributes) -> Self {
        attributes.remove(OBJTYP);
        Self {
            objnam: objnam.into(),
            object_type,
            attributes,
        }
    }

    /// Build an object from attributes carrying an `OBJTYP` tag.
    pub fn from_attributes(objnam: impl Into<String>, attributes: Attributes) -> Option<Self> {
        let object_type = ObjectType::parse(attributes.get(OBJTYP)?);
        Some(Self::new(objnam, object_type, attributes))
    }

    pub fn objnam(&self) -> &str {
        &self.objnam
    }

    pub fn object_type(&self) -> &ObjectType {
        &self.object_type
    }

    pub fn subtype(&self) -> Option<&str> {
        self.get(SUBTYP)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Merge `changes` and return only the entries that actually differed.
    pub(crate) fn merge(&mut self, changes: &Attributes) -> Attributes {
        let mut applied = Attributes::new();
        for (key, value) in changes {
            if key == OBJTYP {
                continue;
            }
            if self.attributes.get(key) != Some(value) {
                self.attributes.insert(key.clone(), value.clone());
                applied.insert(key.clone(), value.clone());
            }
        }
        applied
    }

    // ── Convenience accessors ────────────────────────────────────────

    pub fn sname(&self) -> Option<&str> {
        self.get(SNAME)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS)
    }

    pub fn parent(&self) -> Option<&str> {
        self.get(PARENT)
    }

    /// `STATUS` value meaning "on" for this kind of object.
    pub fn on_status(&self) -> &'static str {
        if self.object_type == ObjectType::Pump { "10" } else { "ON" }
    }

    /// `STATUS` value meaning "off" for this kind of object.
    pub fn off_status(&self) -> &'static str {
        if self.object_type == ObjectType::Pump { "4" } else { "OFF" }
    }

    pub fn is_on(&self) -> bool {
        self.status() == Some(self.on_status())
    }

    pub fn is_a_light(&self) -> bool {
        self.object_type == ObjectType::Circuit
            && self.subtype().is_some_and(|s| LIGHT_SUBTYPES.contains(&s))
    }

    pub fn is_a_light_show(&self) -> bool {
        self.object_type == ObjectType::Circuit && self.subtype() == Some(LIGHT_SHOW_SUBTYPE)
    }

    pub fn is_featured(&self) -> bool {
        self.get(FEATR) == Some("ON")
    }
}

/// Flatten JSON params into string attributes.
///
/// Strings are kept, numbers and booleans are stringified. Nested values
/// (such as a child `OBJLIST`) and nulls are not attributes and are skipped.
pub fn attributes_from_params(params: &Map<String, Value>) -> Attributes {
    params
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
