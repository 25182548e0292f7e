//! Pre-flight uniqueness checks.
//!
//! Advisory only: a concurrent create can pass this check before either
//! insert commits. The store-level unique index is the authority; this
//! exists so feature modules can report "username taken" before attempting
//! the write.

use crate::error::{EngineError, FieldErrors};
use crate::model::UniquenessScope;
use crate::query::Condition;
use crate::store::{Row, StoreDriver};
use crate::response::Success;
use crate::service::crud::CrudEngine;
use serde_json::Value;

impl<S: StoreDriver> CrudEngine<S> {
    /// Report whether `value` is already taken for `field`. The field must be
    /// on the model's `unique_check_fields` allow-list. Whether soft-deleted
    /// rows count as taken follows the engine's configured
    /// [`UniquenessScope`].
    pub async fn validate_unique(
        &self,
        model: &str,
        field: &str,
        value: &Value,
    ) -> Result<Success, EngineError> {
        let model = self.registry().resolve(model)?;
        if !model.unique_check_fields.contains(field) {
            return Err(EngineError::validation(field_error(
                field,
                "is not allowed for uniqueness checks",
            )));
        }
        if !value.is_string() && !value.is_number() {
            return Err(EngineError::validation(field_error(
                field,
                "must be a string or a number",
            )));
        }

        let include_deleted =
            self.uniqueness_scope() == UniquenessScope::IncludeSoftDeleted;
        let rows = self
            .select_one(
                model,
                vec![Condition::eq(field, value.clone())],
                vec![field.to_string()],
                include_deleted,
            )
            .await?;

        if rows.is_empty() {
            let mut data = Row::new();
            data.insert(field.to_string(), value.clone());
            Ok(Self::success_without_rows(data))
        } else {
            Err(EngineError::validation(field_error(
                field,
                "has already been taken",
            )))
        }
    }
}

fn field_error(field: &str, message: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), message.to_string());
    errors
}
