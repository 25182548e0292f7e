//! Model registry: logical names resolved to store-side descriptors.
//!
//! Registration happens once, at startup, while modules compose; the builder
//! is then frozen into an immutable registry shared by every engine call.

use crate::error::{EngineError, RegistryError};
use crate::model::types::{FieldConstraints, FieldDef, FieldType, MatchKind, ModelDef};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Primary key column, injected into every model.
pub const ID_FIELD: &str = "id";

/// Bookkeeping columns maintained by the store, never writable by callers.
const BOOKKEEPING_FIELDS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

/// A declared field, validated and flattened for runtime use.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub name: String,
    pub type_: FieldType,
    pub nullable: bool,
    pub unique: bool,
    pub internal: bool,
    pub match_kind: MatchKind,
    pub has_default: bool,
    pub default: Option<Value>,
    /// Compiled at registration so a bad pattern aborts startup, not a write.
    pub pattern: Option<Regex>,
    pub constraints: FieldConstraints,
}

impl FieldSchema {
    /// Whether callers may persist this field through create/update.
    pub fn writable(&self) -> bool {
        self.name != ID_FIELD && !BOOKKEEPING_FIELDS.contains(&self.name.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub logical_name: String,
    pub store_name: String,
    pub fields: Vec<FieldSchema>,
    pub unique_check_fields: HashSet<String>,
    pub soft_delete: bool,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.writable())
    }
}

pub struct RegistryBuilder {
    prefix: String,
    models: BTreeMap<String, ModelDescriptor>,
}

impl RegistryBuilder {
    /// `prefix` becomes part of every store-side table name
    /// (`<prefix>_<logical_name>`).
    pub fn new(prefix: impl Into<String>) -> Self {
        RegistryBuilder {
            prefix: prefix.into(),
            models: BTreeMap::new(),
        }
    }

    /// Validate and register one model. Re-registration of the same logical
    /// name is rejected to avoid silent schema drift; any failure here should
    /// abort startup.
    pub fn register(&mut self, def: ModelDef) -> Result<(), RegistryError> {
        ensure_identifier(&def.name, &def.name, "model name")?;
        ensure_identifier(&self.prefix, &def.name, "table prefix")?;
        if self.models.contains_key(&def.name) {
            return Err(RegistryError::DuplicateModel(def.name));
        }
        if def.fields.is_empty() {
            return Err(invalid(&def.name, "a model needs at least one field"));
        }

        let mut fields = Vec::with_capacity(def.fields.len() + 4);
        fields.push(FieldSchema {
            name: ID_FIELD.into(),
            type_: FieldType::BigInt,
            nullable: false,
            unique: true,
            internal: false,
            match_kind: MatchKind::Exact,
            has_default: true,
            default: None,
            pattern: None,
            constraints: FieldConstraints::default(),
        });

        let mut seen: HashSet<&str> = HashSet::new();
        for f in &def.fields {
            ensure_identifier(&f.name, &def.name, "field name")?;
            if f.name == ID_FIELD || BOOKKEEPING_FIELDS.contains(&f.name.as_str()) {
                return Err(invalid(
                    &def.name,
                    &format!("field {:?} is reserved", f.name),
                ));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(invalid(
                    &def.name,
                    &format!("field {:?} is declared twice", f.name),
                ));
            }
            let pattern = match &f.constraints.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| {
                    invalid(&def.name, &format!("bad pattern on {:?}: {}", f.name, e))
                })?),
                None => None,
            };
            fields.push(FieldSchema {
                name: f.name.clone(),
                type_: f.type_,
                nullable: f.nullable,
                unique: f.unique,
                internal: f.internal,
                match_kind: f.match_kind,
                has_default: f.default.is_some(),
                default: f.default.clone(),
                pattern,
                constraints: f.constraints.clone(),
            });
        }

        for name in BOOKKEEPING_FIELDS {
            if name == "deleted_at" && !def.soft_delete {
                continue;
            }
            fields.push(FieldSchema {
                name: name.into(),
                type_: FieldType::Timestamp,
                nullable: name == "deleted_at",
                unique: false,
                internal: name == "deleted_at",
                match_kind: MatchKind::Exact,
                has_default: name != "deleted_at",
                default: None,
                pattern: None,
                constraints: FieldConstraints::default(),
            });
        }

        let mut unique_check_fields = HashSet::new();
        for name in &def.unique_check_fields {
            let field = fields.iter().find(|f| f.name == *name).ok_or_else(|| {
                invalid(&def.name, &format!("unique check field {:?} is unknown", name))
            })?;
            if !field.unique {
                // The advisory check needs a store-level index as authority.
                return Err(invalid(
                    &def.name,
                    &format!("unique check field {:?} is not declared unique", name),
                ));
            }
            unique_check_fields.insert(name.clone());
        }

        let store_name = format!("{}_{}", self.prefix, def.name);
        tracing::info!(model = %def.name, table = %store_name, "model registered");
        self.models.insert(
            def.name.clone(),
            ModelDescriptor {
                logical_name: def.name,
                store_name,
                fields,
                unique_check_fields,
                soft_delete: def.soft_delete,
            },
        );
        Ok(())
    }

    /// Freeze the set. No registration is possible afterwards.
    pub fn freeze(self) -> ModelRegistry {
        ModelRegistry {
            models: self.models,
        }
    }
}

/// Read-only after startup; shared by every engine call.
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Called at the start of every engine operation; failure short-circuits
    /// with no store access.
    pub fn resolve(&self, logical_name: &str) -> Result<&ModelDescriptor, EngineError> {
        self.models
            .get(logical_name)
            .ok_or_else(|| EngineError::InvalidModel(logical_name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn invalid(model: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidDefinition {
        model: model.to_string(),
        reason: reason.to_string(),
    }
}

fn ensure_identifier(s: &str, model: &str, what: &str) -> Result<(), RegistryError> {
    let ok = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(invalid(model, &format!("{} {:?} is not a valid identifier", what, s)))
    }
}
