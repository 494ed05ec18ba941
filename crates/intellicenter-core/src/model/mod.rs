// ── Pool object model ──
//
// Objects, their attribute vocabulary, and the model that indexes them.

pub mod attributes;
pub mod object;
pub mod pool;

pub use attributes::{AttributeMap, NULL_OBJNAM, default_attribute_map};
pub use object::{Attributes, ObjectType, PoolObject, attributes_from_params};
pub use pool::{ModelChanges, PoolModel};
