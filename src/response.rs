//! The two-shape wire envelope transport adapters rely on.

use crate::error::{EngineError, FieldErrors};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
pub struct Meta {
    pub count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Success {
    pub data: Value,
    pub meta: Meta,
}

impl Success {
    /// Single-row result.
    pub fn one(data: Value) -> Self {
        Success {
            data,
            meta: Meta { count: 1 },
        }
    }

    /// List result. `count` is the total matching rows disregarding
    /// pagination, not `rows.len()`.
    pub fn many(rows: Vec<Value>, count: u64) -> Self {
        Success {
            data: Value::Array(rows),
            meta: Meta { count },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub error_code: &'static str,
    pub message: String,
    pub field_errors: FieldErrors,
}

/// Serialized as either `{"data": ..., "meta": {"count": n}}` or
/// `{"errorCode": ..., "message": ..., "fieldErrors": {...}}`.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    Success(Success),
    Failure(Failure),
}

impl OperationResult {
    pub fn from_result(result: Result<Success, EngineError>, debug: bool) -> Self {
        match result {
            Ok(success) => OperationResult::Success(success),
            Err(err) => OperationResult::Failure(Failure {
                error_code: err.error_code(),
                message: err.wire_message(debug),
                field_errors: err.field_errors().cloned().unwrap_or_default(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_shape() {
        let out = OperationResult::from_result(
            Ok(Success::one(json!({"id": 1, "username": "alice"}))),
            false,
        );
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["data"]["username"], "alice");
        assert_eq!(v["meta"]["count"], 1);
        assert!(v.get("errorCode").is_none());
    }

    #[test]
    fn failure_envelope_uses_camel_case_keys() {
        let mut errors = FieldErrors::new();
        errors.insert("username".into(), "already taken".into());
        let out =
            OperationResult::from_result(Err(EngineError::validation(errors)), false);
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["errorCode"], "ERROR_VALIDATION_FAILED");
        assert_eq!(v["fieldErrors"]["username"], "already taken");
        assert!(v.get("data").is_none());
    }
}
