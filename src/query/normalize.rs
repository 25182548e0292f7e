//! Pure, total normalization functions. Every caller-facing value is treated
//! as hostile: bad input degrades to a safe default, it never raises. Write
//! endpoints apply stricter validation upstream, in the service layer.

use crate::model::{MatchKind, ModelDescriptor, ID_FIELD};
use serde_json::Value;
use std::collections::HashSet;

/// Pagination bounds, passed in explicitly — never read from ambient config.
#[derive(Clone, Copy, Debug)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Who is asking for the projection. Internal fields (password hashes and the
/// like) are only projected for privileged callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProjectionScope {
    #[default]
    Public,
    Privileged,
}

/// One filter condition, already vetted against the model's allow-list.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub kind: MatchKind,
    pub value: Value,
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            field: field.into(),
            kind: MatchKind::Exact,
            value: value.into(),
        }
    }
}

/// The safe, bounded query a store driver receives. Constructed fresh per
/// request; never persisted.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    pub offset: u32,
    pub limit: u32,
    pub order: Vec<(String, SortDirection)>,
    pub projection: Vec<String>,
    pub filter: Vec<Condition>,
}

/// Non-numeric or non-positive `limit` falls back to the default; a limit
/// above the maximum is clamped; a negative `offset` falls back to 0.
pub fn normalize_pagination(limits: &QueryLimits, pagination: Option<&Value>) -> (u32, u32) {
    let obj = pagination.and_then(Value::as_object);
    let offset = obj
        .and_then(|o| o.get("offset"))
        .and_then(Value::as_i64)
        .filter(|n| *n >= 0)
        .map(|n| n.min(u32::MAX as i64) as u32)
        .unwrap_or(0);
    let limit = obj
        .and_then(|o| o.get("limit"))
        .and_then(Value::as_i64)
        .filter(|n| *n > 0)
        .map(|n| n.min(limits.max_limit as i64) as u32)
        .unwrap_or(limits.default_limit);
    (offset, limit.min(limits.max_limit))
}

/// Unknown fields are dropped, never passed through to the store; direction
/// strings are case-normalized. Defaults to `id DESC` when nothing valid
/// remains.
pub fn normalize_order(
    requested: Option<&Value>,
    model: &ModelDescriptor,
) -> Vec<(String, SortDirection)> {
    let mut order = Vec::new();
    if let Some(obj) = requested.and_then(Value::as_object) {
        for (field, direction) in obj {
            if !model.has_field(field) {
                continue;
            }
            let direction = match direction.as_str().map(str::to_ascii_uppercase).as_deref() {
                Some("ASC") => SortDirection::Asc,
                Some("DESC") => SortDirection::Desc,
                _ => continue,
            };
            order.push((field.clone(), direction));
        }
    }
    if order.is_empty() {
        order.push((ID_FIELD.to_string(), SortDirection::Desc));
    }
    order
}

/// Intersect the requested fields with the model's allow-list, deduplicate,
/// and default to `["id"]` when nothing valid remains. Internal fields
/// survive only for privileged callers.
pub fn normalize_projection(
    requested: Option<&[String]>,
    model: &ModelDescriptor,
    scope: ProjectionScope,
) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut projection = Vec::new();
    for name in requested.unwrap_or_default() {
        let Some(field) = model.field(name) else { continue };
        if field.internal && scope != ProjectionScope::Privileged {
            continue;
        }
        if seen.insert(name.as_str()) {
            projection.push(name.clone());
        }
    }
    if projection.is_empty() {
        projection.push(ID_FIELD.to_string());
    }
    projection
}

/// Classify each condition by the field's configured match policy. Fields off
/// the allow-list and values that are neither string nor number are dropped.
/// A contains match demotes to exact equality for non-string values.
pub fn normalize_filter(requested: Option<&Value>, model: &ModelDescriptor) -> Vec<Condition> {
    let mut filter = Vec::new();
    if let Some(obj) = requested.and_then(Value::as_object) {
        for (field, value) in obj {
            let Some(schema) = model.field(field) else { continue };
            if !value.is_string() && !value.is_number() {
                continue;
            }
            let kind = match schema.match_kind {
                MatchKind::Contains if value.is_string() => MatchKind::Contains,
                _ => MatchKind::Exact,
            };
            filter.push(Condition {
                field: field.clone(),
                kind,
                value: value.clone(),
            });
        }
    }
    filter
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
                {"name": "username", "type": "text", "nullable": false, "unique": true, "match_kind": "contains"},
                {"name": "password", "type": "text", "nullable": false, "internal": true},
                {"name": "status", "type": "integer"}
            ],
            "unique_check_fields": ["username"],
            "soft_delete": true
        }))
        .unwrap();
        let mut builder = RegistryBuilder::new("app");
        builder.register(def).unwrap();
        let registry = builder.freeze();
        registry.resolve("users").unwrap().clone()
    }

    #[test]
    fn pagination_limit_is_always_positive_and_bounded() {
        let limits = QueryLimits::default();
        for input in [
            json!({"limit": -3}),
            json!({"limit": 0}),
            json!({"limit": 1_000_000}),
            json!({"limit": "ten"}),
            json!("not an object"),
        ] {
            let (_, limit) = normalize_pagination(&limits, Some(&input));
            assert!(limit > 0 && limit <= limits.max_limit, "input {input}");
        }
        let (offset, limit) = normalize_pagination(&limits, None);
        assert_eq!((offset, limit), (0, limits.default_limit));
    }

    #[test]
    fn negative_offset_falls_back_to_zero() {
        let (offset, _) =
            normalize_pagination(&QueryLimits::default(), Some(&json!({"offset": -7})));
        assert_eq!(offset, 0);
    }

    #[test]
    fn order_drops_unknown_fields_and_defaults_to_id_desc() {
        let model = users_model();
        let order = normalize_order(
            Some(&json!({"username": "asc", "no_such_field": "desc", "status": "sideways"})),
            &model,
        );
        assert_eq!(order, vec![("username".to_string(), SortDirection::Asc)]);

        let fallback = normalize_order(Some(&json!({"no_such_field": "asc"})), &model);
        assert_eq!(fallback, vec![("id".to_string(), SortDirection::Desc)]);
    }

    #[test]
    fn projection_deduplicates_and_defaults_to_id() {
        let model = users_model();
        let fields = vec![
            "username".to_string(),
            "username".to_string(),
            "no_such_field".to_string(),
        ];
        assert_eq!(
            normalize_projection(Some(&fields), &model, ProjectionScope::Public),
            vec!["username"]
        );
        assert_eq!(
            normalize_projection(None, &model, ProjectionScope::Public),
            vec!["id"]
        );
    }

    #[test]
    fn internal_fields_require_privilege() {
        let model = users_model();
        let fields = vec!["password".to_string()];
        assert_eq!(
            normalize_projection(Some(&fields), &model, ProjectionScope::Public),
            vec!["id"]
        );
        assert_eq!(
            normalize_projection(Some(&fields), &model, ProjectionScope::Privileged),
            vec!["password"]
        );
    }

    #[test]
    fn filter_applies_match_policy_and_drops_junk() {
        let model = users_model();
        let filter = normalize_filter(
            Some(&json!({
                "username": "ali",
                "status": 1,
                "no_such_field": "x",
                "password": {"$ne": null}
            })),
            &model,
        );
        assert_eq!(filter.len(), 2);
        let by_name = |n: &str| filter.iter().find(|c| c.field == n).unwrap();
        assert_eq!(by_name("username").kind, MatchKind::Contains);
        assert_eq!(by_name("status").kind, MatchKind::Exact);
    }
}
