//! Logical models: declaration types and the frozen registry.

mod registry;
mod types;

pub use registry::{FieldSchema, ModelDescriptor, ModelRegistry, RegistryBuilder, ID_FIELD};
pub use types::{FieldConstraints, FieldDef, FieldType, MatchKind, ModelDef, UniquenessScope};
