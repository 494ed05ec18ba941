// ── Pool model ──
//
// All objects known for one controller, indexed by object name in the
// order they were first seen. Every mutation returns the minimal set of
// changes it caused. The model has no internal locking: one task owns
// and mutates it, readers receive immutable snapshots.

use std::collections::BTreeMap;
use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;
use intellicenter_api::{ObjectEntry, ParamQuery};

use super::attributes::{
    AttributeMap, OBJLIST, OBJTYP, PARENT, STATUS, STATUS_DESTROYED, default_attribute_map,
};
use super::object::{Attributes, ObjectType, PoolObject, attributes_from_params};
use crate::error::CoreError;

/// Object name → attributes that changed.
pub type ModelChanges = BTreeMap<String, Attributes>;

/// In-memory view of the controller's equipment.
#[derive(Debug, Clone)]
pub struct PoolModel {
    objects: IndexMap<String, Arc<PoolObject>>,
    attribute_map: Arc<AttributeMap>,
}

impl Default for PoolModel {
    fn default() -> Self {
        Self::new(default_attribute_map())
    }
}

impl PoolModel {
    pub fn new(attribute_map: AttributeMap) -> Self {
        Self {
            objects: IndexMap::new(),
            attribute_map: Arc::new(attribute_map),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, objnam: &str) -> Option<&Arc<PoolObject>> {
        self.objects.get(objnam)
    }

    pub fn contains(&self, objnam: &str) -> bool {
        self.objects.contains_key(objnam)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PoolObject>> {
        self.objects.values()
    }

    pub fn by_type<'a>(&'a self, object_type: &'a ObjectType) -> impl Iterator<Item = &'a Arc<PoolObject>> {
        self.iter().filter(move |obj| obj.object_type() == object_type)
    }

    pub fn by_type_and_subtype<'a>(
        &'a self,
        object_type: &'a ObjectType,
        subtype: &'a str,
    ) -> impl Iterator<Item = &'a Arc<PoolObject>> {
        self.by_type(object_type)
            .filter(move |obj| obj.subtype() == Some(subtype))
    }

    /// Objects whose `PARENT` is `objnam`.
    pub fn children<'a>(&'a self, objnam: &'a str) -> impl Iterator<Item = &'a Arc<PoolObject>> {
        self.iter().filter(move |obj| obj.parent() == Some(objnam))
    }

    /// The first `SYSTEM` object, if any.
    pub fn system_object(&self) -> Option<&Arc<PoolObject>> {
        self.by_type(&ObjectType::System).next()
    }

    pub fn attribute_map(&self) -> &AttributeMap {
        &self.attribute_map
    }

    /// Subscription queries: for every object of a tracked type, the
    /// tracked attributes it actually has, sorted. Objects with nothing
    /// to track are omitted.
    pub fn attributes_to_track(&self) -> Vec<ParamQuery> {
        self.iter()
            .filter_map(|obj| {
                let wanted = self.attribute_map.get(obj.object_type())?;
                let keys: Vec<String> = wanted.iter().filter(|k| obj.has(k)).cloned().collect();
                (!keys.is_empty()).then(|| ParamQuery {
                    objnam: obj.objnam().to_owned(),
                    keys,
                })
            })
            .collect()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Create or merge one object.
    ///
    /// A new object needs an `OBJTYP` attribute and is reported with its
    /// full attribute set. An existing object only reports the attributes
    /// whose value changed. An unknown object without `OBJTYP` is ignored.
    pub fn upsert(&mut self, objnam: &str, attributes: &Attributes) -> ModelChanges {
        let mut changes = ModelChanges::new();

        if let Some(existing) = self.objects.get_mut(objnam) {
            let applied = Arc::make_mut(existing).merge(attributes);
            if !applied.is_empty() {
                changes.insert(objnam.to_owned(), applied);
            }
            return changes;
        }

        match PoolObject::from_attributes(objnam, attributes.clone()) {
            Some(obj) => {
                tracing::debug!(objnam, object_type = %obj.object_type(), "object created");
                let mut reported = obj.attributes().clone();
                reported.insert(OBJTYP.to_owned(), obj.object_type().to_string());
                changes.insert(objnam.to_owned(), reported);
                self.objects.insert(objnam.to_owned(), Arc::new(obj));
            }
            None => {
                tracing::debug!(objnam, "ignoring update for unknown object without OBJTYP");
            }
        }
        changes
    }

    pub fn remove(&mut self, objnam: &str) -> Option<Arc<PoolObject>> {
        let removed = self.objects.shift_remove(objnam);
        if removed.is_some() {
            tracing::debug!(objnam, "object removed");
        }
        removed
    }

    /// Apply an `objectList` from a push or a response.
    ///
    /// Entries reporting `STATUS` `DSTROY` remove the object; the removal
    /// shows up in the changes as that status.
    pub fn apply_updates(&mut self, entries: &[ObjectEntry]) -> ModelChanges {
        let mut changes = ModelChanges::new();
        for entry in entries {
            let attributes = attributes_from_params(&entry.params);

            if attributes.get(STATUS).map(String::as_str) == Some(STATUS_DESTROYED) {
                if self.remove(&entry.objnam).is_some() {
                    changes.insert(
                        entry.objnam.clone(),
                        Attributes::from([(STATUS.to_owned(), STATUS_DESTROYED.to_owned())]),
                    );
                }
                continue;
            }

            for (objnam, applied) in self.upsert(&entry.objnam, &attributes) {
                changes.entry(objnam).or_default().extend(applied);
            }
        }
        changes
    }

    /// Load a hardware definition tree.
    ///
    /// Children live in their parent's `OBJLIST` and receive a `PARENT`
    /// attribute naming it. The whole tree is flattened into this model.
    pub fn load_definition(&mut self, entries: &[ObjectEntry]) -> Result<ModelChanges, CoreError> {
        let mut changes = ModelChanges::new();
        self.load_level(entries, None, &mut changes)?;
        Ok(changes)
    }

    fn load_level(
        &mut self,
        entries: &[ObjectEntry],
        parent: Option<&str>,
        changes: &mut ModelChanges,
    ) -> Result<(), CoreError> {
        for entry in entries {
            let mut attributes = attributes_from_params(&entry.params);
            if let Some(parent) = parent {
                attributes.insert(PARENT.to_owned(), parent.to_owned());
            }
            changes.extend(self.upsert(&entry.objnam, &attributes));

            if let Some(children) = entry.params.get(OBJLIST) {
                let children: Vec<ObjectEntry> = serde_json::from_value(children.clone())
                    .map_err(|e| CoreError::Protocol {
                        message: format!("bad OBJLIST under {}: {e}", entry.objnam),
                    })?;
                self.load_level(&children, Some(&entry.objnam), changes)?;
            }
        }
        Ok(())
    }
}

impl Index<&str> for PoolModel {
    type Output = PoolObject;

    /// Panics if no object has that name.
    fn index(&self, objnam: &str) -> &PoolObject {
        match self.objects.get(objnam) {
            Some(obj) => obj,
            None => panic!("no object named {objnam}"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
