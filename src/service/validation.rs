//! Write-path attribute validation from the model's field constraints.
//! Read endpoints degrade hostile input to safe defaults (see `query`);
//! writes are rejected with per-field messages instead.

use crate::error::FieldErrors;
use crate::model::{FieldSchema, FieldType, ModelDescriptor};
use crate::store::Row;
use serde_json::Value;

/// Validate attributes against the declared constraints. With `partial` set
/// (updates), absent fields are not required; on create every non-nullable
/// field without a store default must be present and saved.
pub(crate) fn validate_write(
    model: &ModelDescriptor,
    attributes: &Row,
    save_fields: &[String],
    partial: bool,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for field in model.writable_fields() {
        let in_save = save_fields.iter().any(|f| f == &field.name);
        let value = if in_save {
            attributes.get(&field.name).filter(|v| !v.is_null())
        } else {
            None
        };
        match value {
            None => {
                if !partial && !field.nullable && !field.has_default {
                    errors.insert(field.name.clone(), "is required".into());
                }
            }
            Some(v) => {
                if let Err(message) = check_field(field, v) {
                    errors.insert(field.name.clone(), message);
                }
            }
        }
    }
    errors
}

fn check_field(field: &FieldSchema, v: &Value) -> Result<(), String> {
    check_type(field.type_, v)?;
    let rules = &field.constraints;
    if let Some(s) = v.as_str() {
        if let Some(max) = rules.max_length {
            if s.chars().count() > max as usize {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = rules.min_length {
            if s.chars().count() < min as usize {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(re) = &field.pattern {
            if !re.is_match(s) {
                return Err("does not match the required pattern".into());
            }
        }
        if let Some(format) = rules.format.as_deref() {
            check_format(format, s)?;
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rules.minimum {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rules.maximum {
            if n > max {
                return Err(format!("must be at most {}", max));
            }
        }
    }
    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    Ok(())
}

fn check_type(type_: FieldType, v: &Value) -> Result<(), String> {
    let ok = match type_ {
        FieldType::Integer | FieldType::BigInt => v.is_i64() || v.is_u64(),
        FieldType::Float => v.is_number(),
        FieldType::Text => v.is_string(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Timestamp => v
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldType::Uuid => v
            .as_str()
            .map(|s| uuid::Uuid::parse_str(s).is_ok())
            .unwrap_or(false),
        FieldType::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(match type_ {
            FieldType::Integer | FieldType::BigInt => "must be an integer".into(),
            FieldType::Float => "must be a number".into(),
            FieldType::Text => "must be a string".into(),
            FieldType::Boolean => "must be a boolean".into(),
            FieldType::Timestamp => "must be an RFC 3339 timestamp".into(),
            FieldType::Uuid => "must be a valid UUID".into(),
            FieldType::Json => String::new(),
        })
    }
}

fn check_format(format: &str, s: &str) -> Result<(), String> {
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err("must be a valid email".into());
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err("must be a valid UUID".into());
            }
        }
        _ => {}
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDef, RegistryBuilder};
    use serde_json::json;

    fn users_model() -> ModelDescriptor {
        let def: ModelDef = serde_json::from_value(json!({
            "name": "users",
            "fields": [
                {
                    "name": "username", "type": "text", "nullable": false, "unique": true,
                    "constraints": {"min_length": 3, "max_length": 254, "pattern": "^[a-zA-Z0-9._]+$"}
                },
                {
                    "name": "email", "type": "text", "nullable": false, "unique": true,
                    "constraints": {"format": "email"}
                },
                {"name": "status", "type": "integer", "constraints": {"allowed": [0, 1, 2]}}
            ]
        }))
        .unwrap();
        let mut builder = RegistryBuilder::new("app");
        builder.register(def).unwrap();
        let registry = builder.freeze();
        registry.resolve("users").unwrap().clone()
    }

    fn attrs(v: Value) -> Row {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_required_fields_are_reported_on_create() {
        let model = users_model();
        let errors = validate_write(
            &model,
            &attrs(json!({"username": "alice"})),
            &["username".into()],
            false,
        );
        assert_eq!(errors.get("email").map(String::as_str), Some("is required"));
        assert!(!errors.contains_key("username"));
    }

    #[test]
    fn partial_updates_skip_absent_fields() {
        let model = users_model();
        let errors = validate_write(
            &model,
            &attrs(json!({"status": 1})),
            &["status".into()],
            true,
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn constraint_violations_carry_per_field_messages() {
        let model = users_model();
        let errors = validate_write(
            &model,
            &attrs(json!({"username": "a!", "email": "nope", "status": 9})),
            &["username".into(), "email".into(), "status".into()],
            true,
        );
        assert!(errors["username"].contains("characters") || errors["username"].contains("pattern"));
        assert_eq!(errors["email"], "must be a valid email");
        assert!(errors["status"].starts_with("must be one of"));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let model = users_model();
        let errors = validate_write(
            &model,
            &attrs(json!({"status": "active"})),
            &["status".into()],
            true,
        );
        assert_eq!(errors["status"], "must be an integer");
    }
}
