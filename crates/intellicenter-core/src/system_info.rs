// ── System information ──
//
// Identity of the connected controller, read once per connection during
// the handshake.

use serde::Serialize;

use crate::model::Attributes;
use crate::model::attributes::{MODE, PROPNAME, SNAME, VER};

/// Facts about the controller as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    /// Installation name shown in the controller's UI.
    pub prop_name: String,
    /// Firmware version.
    pub sw_version: String,
    /// `true` when the controller reports temperatures in Celsius.
    pub uses_metric: bool,
    /// Stable identifier derived from the system name.
    pub unique_id: String,
    /// Object name of the system object.
    pub objnam: String,
}

impl SystemInfo {
    pub fn from_attributes(objnam: &str, attributes: &Attributes) -> Self {
        let get = |key: &str| attributes.get(key).cloned().unwrap_or_default();
        Self {
            prop_name: get(PROPNAME),
            sw_version: get(VER),
            uses_metric: attributes.get(MODE).map(String::as_str) == Some("METRIC"),
            unique_id: unique_id(&get(SNAME)),
            objnam: objnam.to_owned(),
        }
    }

    /// Record a unit system change reported after the handshake.
    pub(crate) fn apply(&mut self, changes: &Attributes) {
        if let Some(mode) = changes.get(MODE) {
            self.uses_metric = mode == "METRIC";
        }
        if let Some(version) = changes.get(VER) {
            self.sw_version.clone_from(version);
        }
    }
}

/// 16 hex characters derived from `name`.
pub fn unique_id(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes());
    hash.as_bytes()[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn builds_from_system_attributes() {
        let info = SystemInfo::from_attributes(
            "INCR",
            &attrs(&[
                ("PROPNAME", "Test Pool System"),
                ("VER", "2.0.0"),
                ("MODE", "ENGLISH"),
                ("SNAME", "IntelliCenter System"),
            ]),
        );
        assert_eq!(info.prop_name, "Test Pool System");
        assert_eq!(info.sw_version, "2.0.0");
        assert!(!info.uses_metric);
        assert_eq!(info.unique_id.len(), 16);
        assert!(info.unique_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn unique_id_is_stable_per_name() {
        assert_eq!(unique_id("Backyard"), unique_id("Backyard"));
        assert_ne!(unique_id("Backyard"), unique_id("Frontyard"));
    }

    #[test]
    fn mode_change_updates_units() {
        let mut info = SystemInfo::from_attributes("SYS01", &attrs(&[("MODE", "ENGLISH")]));
        info.apply(&attrs(&[("MODE", "METRIC")]));
        assert!(info.uses_metric);
    }
}
