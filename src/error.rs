//! Typed errors and the wire-level code mapping.

use crate::store::StoreError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field validation messages, keyed by field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Startup-time registration failures. These abort composition; nothing in
/// this enum is returned to a caller at request time.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("duplicate model {0:?}")]
    DuplicateModel(String),
    #[error("invalid model definition {model:?}: {reason}")]
    InvalidDefinition { model: String, reason: String },
}

/// Request-time failures. Closed taxonomy: every variant maps to exactly one
/// wire code via [`EngineError::error_code`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model {0:?} is not registered")]
    InvalidModel(String),
    #[error("id must be a positive integer, got {0}")]
    InvalidId(i64),
    #[error("no row with id {0}")]
    IdNotFound(i64),
    #[error("no matching row")]
    DataNotFound,
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: FieldErrors,
    },
    #[error("store failure: {cause}")]
    System { cause: String },
}

impl EngineError {
    pub fn validation(field_errors: FieldErrors) -> Self {
        EngineError::Validation {
            message: "validation failed".into(),
            field_errors,
        }
    }

    pub fn validation_message(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            field_errors: FieldErrors::new(),
        }
    }

    /// Wire code for this error. The match is exhaustive on purpose: adding a
    /// variant without a code is a compile error.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidModel(_) => "ERROR_INVALID_MODEL",
            EngineError::InvalidId(_) => "ERROR_INVALID_ID",
            EngineError::IdNotFound(_) => "ERROR_ID_NOT_FOUND",
            EngineError::DataNotFound => "ERROR_DATA_NOT_FOUND",
            EngineError::Validation { .. } => "ERROR_VALIDATION_FAILED",
            EngineError::System { .. } => "ERROR_SYSTEM",
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            EngineError::Validation { field_errors, .. } => Some(field_errors),
            _ => None,
        }
    }

    /// Message for untrusted callers. `ERROR_SYSTEM` details stay server-side
    /// unless the deployment runs in debug mode.
    pub fn wire_message(&self, debug: bool) -> String {
        match self {
            EngineError::System { .. } if !debug => "an error was encountered".into(),
            other => other.to_string(),
        }
    }

    /// Translate a store-level failure. Field-level violations keep only the
    /// fields the current operation declared writable/returnable; everything
    /// else becomes `ERROR_SYSTEM` with the raw cause logged, not returned.
    pub fn from_store(err: StoreError, allowed_fields: &[String]) -> Self {
        match err {
            StoreError::Validation(violations) => {
                let field_errors: FieldErrors = violations
                    .into_iter()
                    .filter(|v| allowed_fields.iter().any(|f| *f == v.field))
                    .map(|v| (v.field, v.message))
                    .collect();
                EngineError::validation(field_errors)
            }
            other => {
                tracing::error!(error = %other, "store failure");
                EngineError::System {
                    cause: other.to_string(),
                }
            }
        }
    }
}
