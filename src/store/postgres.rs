//! PostgreSQL driver: DDL from descriptors, parameterized execution, JSON row
//! decoding. The only module that talks to sqlx.

use crate::model::{FieldType, ModelDescriptor, ID_FIELD};
use crate::sql::{lower, PgBindValue};
use crate::store::driver::{FieldViolation, Row, StoreDriver, StoreError, StoreQuery};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct PgStore {
    pool: PgPool,
    /// Descriptors by store-side table name, cached by `define`.
    tables: RwLock<HashMap<String, ModelDescriptor>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            pool,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn descriptor(&self, table: &str) -> Result<ModelDescriptor, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::UndefinedTable(table.to_string()))
    }
}

#[async_trait]
impl StoreDriver for PgStore {
    async fn define(&self, model: &ModelDescriptor) -> Result<(), StoreError> {
        let ddl = create_table_ddl(model);
        tracing::debug!(sql = %ddl, "define");
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| translate_db_error(&model.store_name, e))?;
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.store_name.clone(), model.clone());
        Ok(())
    }

    async fn execute(&self, query: StoreQuery) -> Result<Vec<Row>, StoreError> {
        let model = self.descriptor(&query.table)?;
        let q = lower(&model, &query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut prepared = sqlx::query(&q.sql);
        for p in &q.params {
            prepared = prepared.bind(PgBindValue::from(p));
        }
        let rows = prepared
            .fetch_all(&self.pool)
            .await
            .map_err(|e| translate_db_error(&query.table, e))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn authenticate(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn sql_type(type_: FieldType) -> &'static str {
    match type_ {
        FieldType::Integer => "INTEGER",
        FieldType::BigInt => "BIGINT",
        FieldType::Float => "DOUBLE PRECISION",
        FieldType::Text => "TEXT",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Timestamp => "TIMESTAMPTZ",
        FieldType::Uuid => "UUID",
        FieldType::Json => "JSONB",
    }
}

fn default_literal(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.into()),
        _ => None,
    }
}

fn create_table_ddl(model: &ModelDescriptor) -> String {
    let mut col_defs: Vec<String> = Vec::new();
    for f in &model.fields {
        if f.name == ID_FIELD {
            col_defs.push(format!("{} BIGSERIAL PRIMARY KEY", quote(ID_FIELD)));
            continue;
        }
        match f.name.as_str() {
            "created_at" | "updated_at" => {
                col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quote(&f.name)));
                continue;
            }
            "deleted_at" => {
                col_defs.push(format!("{} TIMESTAMPTZ", quote(&f.name)));
                continue;
            }
            _ => {}
        }
        let mut def = format!("{} {}", quote(&f.name), sql_type(f.type_));
        if !f.nullable {
            def.push_str(" NOT NULL");
        }
        if f.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(lit) = f.default.as_ref().and_then(default_literal) {
            def.push_str(" DEFAULT ");
            def.push_str(&lit);
        }
        col_defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(&model.store_name),
        col_defs.join(",\n  ")
    )
}

/// Map a sqlx failure onto the driver contract. Unique-index violations come
/// back as field-level violations; the constraint name follows PostgreSQL's
/// `<table>_<column>_key` convention.
fn translate_db_error(table: &str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => {
                let field = db
                    .constraint()
                    .map(|c| field_from_constraint(table, c))
                    .unwrap_or_else(|| "unknown".into());
                StoreError::Validation(vec![FieldViolation {
                    message: format!("this {} has already been taken", field),
                    field,
                }])
            }
            Some("23502") | Some("23514") => StoreError::Validation(vec![FieldViolation {
                field: db.constraint().unwrap_or("unknown").to_string(),
                message: "violates a store constraint".into(),
            }]),
            _ => StoreError::Backend(db.message().to_string()),
        },
        sqlx::Error::Io(e) => StoreError::Connection(e.to_string()),
        err @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
            StoreError::Connection(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn field_from_constraint(table: &str, constraint: &str) -> String {
    constraint
        .strip_prefix(&format!("{}_", table))
        .and_then(|s| s.strip_suffix("_key"))
        .unwrap_or(constraint)
        .to_string()
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
