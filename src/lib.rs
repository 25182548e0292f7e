//! Datagate SDK: model-registry-driven data-access engine over PostgreSQL.

pub mod error;
pub mod model;
pub mod query;
pub mod response;
pub mod service;
pub mod sql;
pub mod store;

pub use error::{EngineError, FieldErrors, RegistryError};
pub use model::{
    FieldConstraints, FieldDef, FieldType, MatchKind, ModelDef, ModelDescriptor, ModelRegistry,
    RegistryBuilder, UniquenessScope,
};
pub use query::{
    Condition, ProjectionScope, QueryDescriptor, QueryLimits, SortDirection,
};
pub use response::{Meta, OperationResult, Success};
pub use service::{CrudEngine, EngineConfig};
pub use store::{FieldViolation, PgStore, Row, StoreDriver, StoreError, StoreOp, StoreQuery};
