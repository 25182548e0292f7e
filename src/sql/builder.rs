//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a logical store
//! query plus the model descriptor. Identifiers only ever come from the
//! registry, never from callers; values always bind as placeholders.

use crate::model::{FieldType, MatchKind, ModelDescriptor, ID_FIELD};
use crate::query::{Condition, SortDirection};
use crate::store::{StoreOp, StoreQuery};
use serde_json::Value;

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Quote identifier for PostgreSQL (safe: only from the registry).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// SQL cast for columns whose values bind as text/JSON.
fn cast_for(type_: FieldType) -> Option<&'static str> {
    match type_ {
        FieldType::Timestamp => Some("timestamptz"),
        FieldType::Uuid => Some("uuid"),
        FieldType::Json => Some("jsonb"),
        _ => None,
    }
}

fn placeholder(model: &ModelDescriptor, column: &str, n: usize) -> String {
    model
        .field(column)
        .and_then(|f| cast_for(f.type_))
        .map(|t| format!("${}::{}", n, t))
        .unwrap_or_else(|| format!("${}", n))
}

fn projection_list(projection: &[String]) -> String {
    if projection.is_empty() {
        return quoted(ID_FIELD);
    }
    projection
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE parts for filter conditions plus the soft-delete guard. Unknown
/// columns were dropped by normalization; re-checked here all the same.
fn condition_clauses(
    q: &mut QueryBuf,
    model: &ModelDescriptor,
    conditions: &[Condition],
    soft_delete: bool,
    include_deleted: bool,
) -> Vec<String> {
    let mut parts = Vec::new();
    for c in conditions {
        if !model.has_field(&c.field) {
            continue;
        }
        match c.kind {
            MatchKind::Contains => {
                let needle = c.value.as_str().unwrap_or_default();
                let n = q.push_param(Value::String(format!("%{}%", needle)));
                parts.push(format!("{} ILIKE ${}", quoted(&c.field), n));
            }
            MatchKind::Exact => {
                let n = q.push_param(c.value.clone());
                parts.push(format!("{} = {}", quoted(&c.field), placeholder(model, &c.field, n)));
            }
        }
    }
    if soft_delete && !include_deleted {
        parts.push(format!("{} IS NULL", quoted("deleted_at")));
    }
    parts
}

fn where_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(order: &[(String, SortDirection)]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order
        .iter()
        .map(|(field, dir)| format!("{} {}", quoted(field), dir.as_sql()))
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// Lower one logical query to parameterized SQL.
pub fn lower(model: &ModelDescriptor, query: &StoreQuery) -> QueryBuf {
    let table = quoted(&query.table);
    match &query.op {
        StoreOp::Insert { values, returning } => insert(model, &table, values, returning),
        StoreOp::Select {
            conditions,
            projection,
            order,
            limit,
            offset,
            include_deleted,
        } => {
            let mut q = QueryBuf::new();
            let parts =
                condition_clauses(&mut q, model, conditions, query.soft_delete, *include_deleted);
            let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
            let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
            q.sql = format!(
                "SELECT {} FROM {}{}{}{}{}",
                projection_list(projection),
                table,
                where_clause(&parts),
                order_clause(order),
                limit_clause,
                offset_clause
            );
            q
        }
        StoreOp::Count {
            conditions,
            include_deleted,
        } => {
            let mut q = QueryBuf::new();
            let parts =
                condition_clauses(&mut q, model, conditions, query.soft_delete, *include_deleted);
            q.sql = format!(
                "SELECT COUNT(*) AS count FROM {}{}",
                table,
                where_clause(&parts)
            );
            q
        }
        StoreOp::UpdateById {
            id,
            values,
            returning,
        } => update_by_id(model, &table, query.soft_delete, *id, values, returning),
        StoreOp::DeleteById { id, returning } => {
            let mut q = QueryBuf::new();
            let n = q.push_param(Value::from(*id));
            if query.soft_delete {
                // Flag, don't remove; RETURNING still yields the pre-deletion row.
                q.sql = format!(
                    "UPDATE {} SET {} = NOW() WHERE {} = ${} AND {} IS NULL RETURNING {}",
                    table,
                    quoted("deleted_at"),
                    quoted(ID_FIELD),
                    n,
                    quoted("deleted_at"),
                    projection_list(returning)
                );
            } else {
                q.sql = format!(
                    "DELETE FROM {} WHERE {} = ${} RETURNING {}",
                    table,
                    quoted(ID_FIELD),
                    n,
                    projection_list(returning)
                );
            }
            q
        }
    }
}

fn insert(
    model: &ModelDescriptor,
    table: &str,
    values: &[(String, Value)],
    returning: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, value) in values {
        if !model.has_field(name) {
            continue;
        }
        let n = q.push_param(value.clone());
        cols.push(quoted(name));
        placeholders.push(placeholder(model, name, n));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        projection_list(returning)
    );
    q
}

/// Single conditional statement: zero rows back means no live row had this
/// id, with no separate load step to race against.
fn update_by_id(
    model: &ModelDescriptor,
    table: &str,
    soft_delete: bool,
    id: i64,
    values: &[(String, Value)],
    returning: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (name, value) in values {
        if name == ID_FIELD || !model.has_field(name) {
            continue;
        }
        let n = q.push_param(value.clone());
        sets.push(format!("{} = {}", quoted(name), placeholder(model, name, n)));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let id_param = q.push_param(Value::from(id));
    let deleted_guard = if soft_delete {
        format!(" AND {} IS NULL", quoted("deleted_at"))
    } else {
        String::new()
    };
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}{} RETURNING {}",
        table,
        sets.join(", "),
        quoted(ID_FIELD),
        id_param,
        deleted_guard,
        projection_list(returning)
    );
    q
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
                {"name": "status", "type": "integer"}
            ],
            "soft_delete": true
        }))
        .unwrap();
        let mut builder = RegistryBuilder::new("kryptstorm");
        builder.register(def).unwrap();
        let registry = builder.freeze();
        registry.resolve("users").unwrap().clone()
    }

    fn query(op: StoreOp) -> StoreQuery {
        StoreQuery {
            table: "kryptstorm_users".into(),
            soft_delete: true,
            op,
        }
    }

    #[test]
    fn select_includes_filters_order_and_soft_delete_guard() {
        let model = users_model();
        let q = lower(
            &model,
            &query(StoreOp::Select {
                conditions: vec![Condition {
                    field: "username".into(),
                    kind: MatchKind::Contains,
                    value: json!("ali"),
                }],
                projection: vec!["id".into(), "username".into()],
                order: vec![("id".into(), SortDirection::Desc)],
                limit: Some(10),
                offset: Some(0),
                include_deleted: false,
            }),
        );
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"username\" FROM \"kryptstorm_users\" \
             WHERE \"username\" ILIKE $1 AND \"deleted_at\" IS NULL \
             ORDER BY \"id\" DESC LIMIT 10 OFFSET 0"
        );
        assert_eq!(q.params, vec![json!("%ali%")]);
    }

    #[test]
    fn count_ignores_pagination() {
        let model = users_model();
        let q = lower(
            &model,
            &query(StoreOp::Count {
                conditions: vec![Condition::eq("status", 1)],
                include_deleted: false,
            }),
        );
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS count FROM \"kryptstorm_users\" \
             WHERE \"status\" = $1 AND \"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn insert_returns_the_requested_projection() {
        let model = users_model();
        let q = lower(
            &model,
            &query(StoreOp::Insert {
                values: vec![
                    ("username".into(), json!("alice")),
                    ("status".into(), json!(1)),
                ],
                returning: vec!["id".into(), "username".into()],
            }),
        );
        assert_eq!(
            q.sql,
            "INSERT INTO \"kryptstorm_users\" (\"username\", \"status\") \
             VALUES ($1, $2) RETURNING \"id\", \"username\""
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_is_one_conditional_statement() {
        let model = users_model();
        let q = lower(
            &model,
            &query(StoreOp::UpdateById {
                id: 7,
                values: vec![("status".into(), json!(2))],
                returning: vec!["id".into()],
            }),
        );
        assert_eq!(
            q.sql,
            "UPDATE \"kryptstorm_users\" SET \"status\" = $1, \"updated_at\" = NOW() \
             WHERE \"id\" = $2 AND \"deleted_at\" IS NULL RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!(2), json!(7)]);
    }

    #[test]
    fn soft_delete_flags_instead_of_removing() {
        let model = users_model();
        let q = lower(
            &model,
            &query(StoreOp::DeleteById {
                id: 7,
                returning: vec!["id".into(), "username".into()],
            }),
        );
        assert!(q.sql.starts_with("UPDATE"));
        assert!(q.sql.contains("\"deleted_at\" = NOW()"));
        assert!(q.sql.contains("RETURNING \"id\", \"username\""));
    }

    #[test]
    fn hard_delete_uses_delete_returning() {
        let model = users_model();
        let q = lower(
            &model,
            &StoreQuery {
                table: "kryptstorm_users".into(),
                soft_delete: false,
                op: StoreOp::DeleteById {
                    id: 7,
                    returning: vec!["id".into()],
                },
            },
        );
        assert_eq!(
            q.sql,
            "DELETE FROM \"kryptstorm_users\" WHERE \"id\" = $1 RETURNING \"id\""
        );
    }
}
