//! The driver seam. The engine only ever hands a driver a logical
//! [`StoreQuery`]; SQL is a driver concern. Tests substitute an in-memory
//! implementation with call counters.

use crate::model::ModelDescriptor;
use crate::query::{Condition, SortDirection};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One row, as JSON. Column order is not significant.
pub type Row = serde_json::Map<String, Value>;

#[derive(Clone, Debug)]
pub struct StoreQuery {
    /// Store-side table name, as resolved by the registry.
    pub table: String,
    /// Whether the table uses soft deletes (`deleted_at` flag).
    pub soft_delete: bool,
    pub op: StoreOp,
}

#[derive(Clone, Debug)]
pub enum StoreOp {
    Insert {
        values: Vec<(String, Value)>,
        returning: Vec<String>,
    },
    Select {
        conditions: Vec<Condition>,
        projection: Vec<String>,
        order: Vec<(String, SortDirection)>,
        limit: Option<u32>,
        offset: Option<u32>,
        /// Soft-deleted rows are normally invisible; uniqueness checks may
        /// opt in to seeing them.
        include_deleted: bool,
    },
    /// Total matching rows disregarding pagination.
    Count {
        conditions: Vec<Condition>,
        include_deleted: bool,
    },
    /// Single conditional statement; an empty result means no live row had
    /// this id. No load-then-write window.
    UpdateById {
        id: i64,
        values: Vec<(String, Value)>,
        returning: Vec<String>,
    },
    /// Returns the pre-deletion projection. Soft-delete tables flag the row
    /// instead of removing it.
    DeleteById {
        id: i64,
        returning: Vec<String>,
    },
}

/// A field-level violation surfaced by the store (unique index, not-null,
/// check constraint).
#[derive(Clone, Debug)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("store unavailable: {0}")]
    Connection(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("table {0:?} is not defined")]
    UndefinedTable(String),
    #[error("store failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Bind a model's table, creating it if the backend supports that.
    /// Called once per model at startup, before any `execute`.
    async fn define(&self, model: &ModelDescriptor) -> Result<(), StoreError>;

    /// Run one logical query; one network round trip per call.
    async fn execute(&self, query: StoreQuery) -> Result<Vec<Row>, StoreError>;

    /// Connection liveness check, run at startup.
    async fn authenticate(&self) -> Result<(), StoreError>;
}
