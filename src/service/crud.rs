//! Generic CRUD execution against a store driver.
//!
//! Every verb runs the same pipeline: resolve the model, validate input for
//! writes, normalize the query, execute, translate failures. The engine holds
//! no mutable state; the registry is frozen and shared.

use crate::error::EngineError;
use crate::model::{ModelDescriptor, ModelRegistry, UniquenessScope};
use crate::query::{
    normalize_filter, normalize_order, normalize_pagination, normalize_projection, Condition,
    ProjectionScope, QueryDescriptor, QueryLimits,
};
use crate::response::{Meta, OperationResult, Success};
use crate::service::validation::validate_write;
use crate::store::{Row, StoreDriver, StoreError, StoreOp, StoreQuery};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub limits: QueryLimits,
    /// Deadline for each store round trip; expiry surfaces as `ERROR_SYSTEM`.
    pub op_timeout: Option<Duration>,
    pub uniqueness_scope: UniquenessScope,
    /// With debug on, `ERROR_SYSTEM` wire messages carry the raw cause.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            limits: QueryLimits::default(),
            op_timeout: None,
            uniqueness_scope: UniquenessScope::default(),
            debug: false,
        }
    }
}

pub struct CrudEngine<S> {
    store: Arc<S>,
    registry: Arc<ModelRegistry>,
    config: EngineConfig,
    scope: ProjectionScope,
}

impl<S: StoreDriver> CrudEngine<S> {
    pub fn new(store: Arc<S>, registry: Arc<ModelRegistry>, config: EngineConfig) -> Self {
        CrudEngine {
            store,
            registry,
            config,
            scope: ProjectionScope::Public,
        }
    }

    /// A handle whose projections may include internal fields. Hand this only
    /// to code that is allowed to read password hashes and the like.
    pub fn privileged(&self) -> CrudEngine<S> {
        CrudEngine {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            scope: ProjectionScope::Privileged,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub(crate) fn uniqueness_scope(&self) -> UniquenessScope {
        self.config.uniqueness_scope
    }

    /// Fold a verb result into the wire envelope.
    pub fn respond(&self, result: Result<Success, EngineError>) -> OperationResult {
        OperationResult::from_result(result, self.config.debug)
    }

    /// Insert one row and re-read it with the callers' projection. The engine
    /// never infers which fields are safe to persist: `save_fields` defaults
    /// to the attribute keys, and narrowing it is the feature module's job.
    pub async fn create(
        &self,
        model: &str,
        attributes: &Row,
        save_fields: Option<&[String]>,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        if attributes.is_empty() {
            return Err(EngineError::validation_message(
                "cannot create an item without attributes",
            ));
        }
        let save = resolve_save_fields(attributes, save_fields);
        let errors = validate_write(model, attributes, &save, false);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }
        let values = persistable_values(model, attributes, &save);
        if values.is_empty() {
            return Err(EngineError::validation_message(
                "none of the given attributes are persistable",
            ));
        }
        let returning = normalize_projection(return_fields, model, self.scope);
        let rows = self
            .run(model, StoreOp::Insert { values, returning }, &save)
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Success::one(Value::Object(row))),
            None => Err(EngineError::System {
                cause: "insert returned no row".into(),
            }),
        }
    }

    /// Count-and-fetch. `meta.count` is the total matching rows disregarding
    /// pagination, so callers can build page counts.
    pub async fn find_all(
        &self,
        model: &str,
        where_: Option<&Value>,
        order: Option<&Value>,
        pagination: Option<&Value>,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        let (offset, limit) = normalize_pagination(&self.config.limits, pagination);
        let query = QueryDescriptor {
            offset,
            limit,
            order: normalize_order(order, model),
            projection: normalize_projection(return_fields, model, self.scope),
            filter: normalize_filter(where_, model),
        };

        let count_rows = self
            .run(
                model,
                StoreOp::Count {
                    conditions: query.filter.clone(),
                    include_deleted: false,
                },
                &[],
            )
            .await?;
        let count = count_rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let rows = self
            .run(
                model,
                StoreOp::Select {
                    conditions: query.filter,
                    projection: query.projection,
                    order: query.order,
                    limit: Some(query.limit),
                    offset: Some(query.offset),
                    include_deleted: false,
                },
                &[],
            )
            .await?;
        Ok(Success::many(rows.into_iter().map(Value::Object).collect(), count))
    }

    /// Id-based lookup. A non-positive id is rejected before any store
    /// access; a miss is `ERROR_ID_NOT_FOUND`, distinct from a bad id.
    pub async fn find_by_id(
        &self,
        model: &str,
        id: i64,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        ensure_id(id)?;
        let projection = normalize_projection(return_fields, model, self.scope);
        let rows = self.select_one(model, vec![Condition::eq("id", id)], projection, false).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Success::one(Value::Object(row))),
            None => Err(EngineError::IdNotFound(id)),
        }
    }

    /// Condition-based single-row lookup; a miss is `ERROR_DATA_NOT_FOUND`.
    pub async fn find_one(
        &self,
        model: &str,
        where_: Option<&Value>,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        let filter = normalize_filter(where_, model);
        let projection = normalize_projection(return_fields, model, self.scope);
        let rows = self.select_one(model, filter, projection, false).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Success::one(Value::Object(row))),
            None => Err(EngineError::DataNotFound),
        }
    }

    /// One conditional `UPDATE ... RETURNING`: no separate load step, so a
    /// concurrent writer cannot slip between a read and the write.
    pub async fn update(
        &self,
        model: &str,
        id: i64,
        attributes: &Row,
        save_fields: Option<&[String]>,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        ensure_id(id)?;
        if attributes.is_empty() {
            return Err(EngineError::validation_message(
                "cannot update an item without attributes",
            ));
        }
        let save = resolve_save_fields(attributes, save_fields);
        let errors = validate_write(model, attributes, &save, true);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }
        let values = persistable_values(model, attributes, &save);
        if values.is_empty() {
            return Err(EngineError::validation_message(
                "none of the given attributes are persistable",
            ));
        }
        let returning = normalize_projection(return_fields, model, self.scope);
        let rows = self
            .run(
                model,
                StoreOp::UpdateById {
                    id,
                    values,
                    returning,
                },
                &save,
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Success::one(Value::Object(row))),
            None => Err(EngineError::IdNotFound(id)),
        }
    }

    /// Delete (or soft-delete) one row, returning its pre-deletion projection
    /// so callers can show what was removed.
    pub async fn delete_by_id(
        &self,
        model: &str,
        id: i64,
        return_fields: Option<&[String]>,
    ) -> Result<Success, EngineError> {
        let model = self.registry.resolve(model)?;
        ensure_id(id)?;
        let returning = normalize_projection(return_fields, model, self.scope);
        let rows = self
            .run(model, StoreOp::DeleteById { id, returning }, &[])
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Success::one(Value::Object(row))),
            None => Err(EngineError::IdNotFound(id)),
        }
    }

    /// Shared single-row select; also backs the uniqueness validator.
    pub(crate) async fn select_one(
        &self,
        model: &ModelDescriptor,
        conditions: Vec<Condition>,
        projection: Vec<String>,
        include_deleted: bool,
    ) -> Result<Vec<Row>, EngineError> {
        self.run(
            model,
            StoreOp::Select {
                conditions,
                projection,
                order: Vec::new(),
                limit: Some(1),
                offset: None,
                include_deleted,
            },
            &[],
        )
        .await
    }

    pub(crate) fn success_without_rows(data: Row) -> Success {
        Success {
            data: Value::Object(data),
            meta: Meta { count: 0 },
        }
    }

    /// One store round trip, bounded by the configured deadline. Failures are
    /// translated with field messages filtered to `allowed_fields`.
    pub(crate) async fn run(
        &self,
        model: &ModelDescriptor,
        op: StoreOp,
        allowed_fields: &[String],
    ) -> Result<Vec<Row>, EngineError> {
        let query = StoreQuery {
            table: model.store_name.clone(),
            soft_delete: model.soft_delete,
            op,
        };
        tracing::debug!(model = %model.logical_name, table = %query.table, op = ?query.op, "execute");
        let fut = self.store.execute(query);
        let result = match self.config.op_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            },
            None => fut.await,
        };
        result.map_err(|e| EngineError::from_store(e, allowed_fields))
    }
}

fn ensure_id(id: i64) -> Result<(), EngineError> {
    if id > 0 {
        Ok(())
    } else {
        Err(EngineError::InvalidId(id))
    }
}

fn resolve_save_fields(attributes: &Row, save_fields: Option<&[String]>) -> Vec<String> {
    match save_fields {
        Some(fields) if !fields.is_empty() => fields.to_vec(),
        _ => attributes.keys().cloned().collect(),
    }
}

/// Attributes that will actually be persisted: on the save list, writable,
/// and declared on the model. Everything else is dropped, never sent to the
/// store.
fn persistable_values(
    model: &ModelDescriptor,
    attributes: &Row,
    save: &[String],
) -> Vec<(String, Value)> {
    model
        .writable_fields()
        .filter(|f| save.iter().any(|s| *s == f.name))
        .filter_map(|f| attributes.get(&f.name).map(|v| (f.name.clone(), v.clone())))
        .collect()
}
