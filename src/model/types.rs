//! Raw model declaration types: what a feature module hands to the registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    BigInt,
    Float,
    Text,
    Boolean,
    Timestamp,
    Uuid,
    Json,
}

/// How a filter condition on this field is matched: exact equality or a
/// contains (substring) search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    Contains,
}

/// Whether uniqueness checks see soft-deleted rows. The source system was
/// inconsistent about this; here it is an explicit engine configuration.
/// `IncludeSoftDeleted` means a deleted username is still considered taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    #[default]
    IncludeSoftDeleted,
    ActiveOnly,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    /// "email" or "uuid"; anything else is ignored.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Internal fields are never projected for unprivileged callers
    /// (e.g. password hashes).
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub match_kind: MatchKind,
    /// Store-side default; a literal value, rendered into the DDL.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: FieldConstraints,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Fields `validate_unique` may be asked about. Each must be declared
    /// `unique` so the store-level index stays the authority.
    #[serde(default)]
    pub unique_check_fields: Vec<String>,
    #[serde(default)]
    pub soft_delete: bool,
}
