//! Model CRUD surface.
//!
//! A [`Model`] binds an [`Entity`] type to its resolved schema and base
//! logical database, optionally scoped to a tenant. Every call compiles a
//! fresh statement, resolves the target database through the tenant router
//! and picks the primary or replica pool by query kind.

use crate::db::compiler::{CompiledQuery, QueryCompiler, RowData, UpdateData};
use crate::db::executor::{JsonRow, QueryExecutor};
use crate::db::pool::{LogicalDatabase, QueryKind};
use crate::db::registry::Registry;
use crate::db::schema::{ColumnRole, ColumnType, Entity, ModelSchema};
use crate::db::tenant::{TenantId, TenantRouter};
use crate::error::{DbError, DbResult};
use crate::models::{Conditions, Operator, QueryOptions, Value};
use chrono::{Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use tracing::warn;

/// Column stamped by [`AuditedModel`] when the schema has no update-time column.
pub const DEFAULT_UPDATED_TIME_COLUMN: &str = "updated_time";

/// Current local wall-clock time, as stored in audit columns.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// CRUD operations for the entity type `E`.
pub struct Model<E: Entity> {
    registry: Arc<Registry>,
    database: String,
    schema: Arc<ModelSchema>,
    tenant: Option<TenantId>,
    executor: QueryExecutor,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Model<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            database: self.database.clone(),
            schema: Arc::clone(&self.schema),
            tenant: self.tenant,
            executor: self.executor,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Model<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.schema.table)
            .field("database", &self.database)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Model<E> {
    /// Model bound to the database `E` was registered with.
    pub fn new(registry: &Arc<Registry>) -> DbResult<Self> {
        let binding = registry.binding_for::<E>()?;
        Ok(Self {
            registry: Arc::clone(registry),
            database: binding.database.clone(),
            schema: Arc::clone(&binding.schema),
            tenant: None,
            executor: QueryExecutor::new(),
            _entity: PhantomData,
        })
    }

    /// Scope every query of this model to `tenant_id`. Zero means no tenant.
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant = (tenant_id != 0).then_some(tenant_id);
        self
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.tenant.is_some()
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        &self.schema.table
    }

    pub fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    /// Logical database serving this model and tenant.
    pub fn database(&self) -> DbResult<Arc<LogicalDatabase>> {
        TenantRouter::new(&self.registry).resolve(self.tenant, &self.database)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert one entity. Unset creation and update time columns are stamped.
    pub async fn insert(&self, entity: &E) -> DbResult<u64> {
        self.insert_many(std::slice::from_ref(entity)).await
    }

    /// Insert several entities with one statement.
    pub async fn insert_many(&self, entities: &[E]) -> DbResult<u64> {
        let now = local_now();
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities {
            let mut row = self.entity_row(entity)?;
            for column in &self.schema.columns {
                if matches!(column.role, ColumnRole::CreatedAt | ColumnRole::UpdatedAt)
                    && row.get(&column.column).is_none_or(Value::is_null)
                {
                    row.insert(column.column.clone(), Value::Timestamp(now));
                }
            }
            rows.push(row);
        }

        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).insert(&self.schema, &rows)?;
        self.write(&database, &query).await
    }

    /// Update matching rows from a column map.
    ///
    /// A primary key in `data` is never written. It becomes an equality
    /// condition unless `conditions` already pin the primary key with `=` or
    /// `IN`, in which case it is dropped. Composite values are stored
    /// JSON-encoded and floats as decimal strings. Timestamps are not stamped on this path.
    pub async fn update_by_conditions(
        &self,
        mut conditions: Conditions,
        mut data: UpdateData,
    ) -> DbResult<u64> {
        let pk = self.primary_key().to_string();
        if let Some(id) = data.remove(&pk) {
            let pinned = conditions
                .iter()
                .any(|c| c.column == pk && matches!(c.op, Operator::Eq | Operator::In));
            if pinned {
                warn!(table = %self.schema.table, "Primary key in update data ignored");
            } else {
                conditions.add_eq(pk, id);
            }
        }
        let data: UpdateData = data
            .into_iter()
            .map(|(column, value)| (column, value.into_update_value()))
            .collect();

        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).update(&self.schema, &data, &conditions)?;
        let affected = self.write(&database, &query).await?;
        if affected == 0 {
            return Err(DbError::no_rows_affected(format!(
                "update {}",
                self.schema.table
            )));
        }
        Ok(affected)
    }

    pub async fn update_by_id(&self, id: i64, data: UpdateData) -> DbResult<u64> {
        self.update_by_conditions(Conditions::single_eq(self.primary_key(), id), data)
            .await
    }

    pub async fn update_by_ids(&self, ids: &[i64], data: UpdateData) -> DbResult<u64> {
        self.update_by_conditions(self.ids_condition(ids), data).await
    }

    /// Write every column of `entity` to the row with its primary key.
    ///
    /// The update time column is stamped; an unset creation time is left
    /// untouched.
    pub async fn save(&self, entity: &E) -> DbResult<u64> {
        let mut row = self.entity_row(entity)?;
        let pk = self.primary_key().to_string();
        let id = row.remove(&pk).unwrap_or(Value::Null);
        if id.is_zero_key() {
            return Err(DbError::invalid_input(format!(
                "save on {} requires a primary key value",
                self.schema.table
            )));
        }

        let now = local_now();
        for column in &self.schema.columns {
            match column.role {
                ColumnRole::UpdatedAt => {
                    row.insert(column.column.clone(), Value::Timestamp(now));
                }
                ColumnRole::CreatedAt if row.get(&column.column).is_some_and(Value::is_null) => {
                    row.remove(&column.column);
                }
                _ => {}
            }
        }

        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).update(
            &self.schema,
            &row,
            &Conditions::single_eq(pk, id),
        )?;
        let affected = self.write(&database, &query).await?;
        if affected == 0 {
            return Err(DbError::no_rows_affected(format!("save {}", self.schema.table)));
        }
        Ok(affected)
    }

    /// Delete matching rows; returns the number removed.
    pub async fn delete_by_conditions(&self, conditions: Conditions) -> DbResult<u64> {
        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).delete(&self.schema, &conditions)?;
        self.write(&database, &query).await
    }

    pub async fn delete_by_id(&self, id: i64) -> DbResult<u64> {
        self.delete_by_conditions(Conditions::single_eq(self.primary_key(), id))
            .await
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> DbResult<u64> {
        self.delete_by_conditions(self.ids_condition(ids)).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn exists(&self, conditions: Conditions) -> DbResult<bool> {
        Ok(self.count(conditions).await? > 0)
    }

    pub async fn count(&self, conditions: Conditions) -> DbResult<u64> {
        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).count(&conditions, &self.schema)?;
        let pool = database.pool_for(query.kind, false);
        self.executor.fetch_count(pool, &query).await
    }

    /// Number of distinct `fields` tuples among matching rows; no fields means
    /// whole rows.
    pub async fn count_distinct(&self, fields: &[&str], conditions: Conditions) -> DbResult<u64> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).count_distinct(
            &fields,
            &conditions,
            &self.schema,
        )?;
        let pool = database.pool_for(query.kind, false);
        self.executor.fetch_count(pool, &query).await
    }

    /// Rows matching `options`, ordered by primary key unless told otherwise.
    pub async fn find_many(&self, options: QueryOptions) -> DbResult<Vec<E>> {
        self.find_many_as(options).await
    }

    /// First row matching `options`, or [`DbError::NotFound`].
    pub async fn find_one(&self, options: QueryOptions) -> DbResult<E> {
        self.find_one_as(options).await
    }

    /// Like [`find_many`](Self::find_many), deserializing into a projection type.
    pub async fn find_many_as<T: DeserializeOwned>(&self, options: QueryOptions) -> DbResult<Vec<T>> {
        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).select(&options, &self.schema)?;
        let rows = self.read(&database, &query, options.force).await?;
        rows.into_iter().map(deserialize_row).collect()
    }

    /// Like [`find_one`](Self::find_one), deserializing into a projection type.
    pub async fn find_one_as<T: DeserializeOwned>(&self, options: QueryOptions) -> DbResult<T> {
        let database = self.database()?;
        let query = QueryCompiler::new(database.driver()).select_first(&options, &self.schema)?;
        let rows = self.read(&database, &query, options.force).await?;
        match rows.into_iter().next() {
            Some(row) => deserialize_row(row),
            None => Err(DbError::not_found(format!(
                "no {} row matches the query",
                self.schema.table
            ))),
        }
    }

    /// Row with primary key `id`. Empty `fields` selects every column.
    pub async fn find_by_id(&self, id: i64, fields: &[&str]) -> DbResult<E> {
        let options = QueryOptions::new()
            .with_fields(fields.iter().copied())
            .add_eq_condition(self.primary_key(), id);
        self.find_one(options).await
    }

    pub async fn find_by_ids(&self, ids: &[i64], fields: &[&str]) -> DbResult<Vec<E>> {
        let options = QueryOptions::new()
            .with_fields(fields.iter().copied())
            .add_condition(self.primary_key(), Operator::In, ids);
        self.find_many(options).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ids_condition(&self, ids: &[i64]) -> Conditions {
        Conditions::single(self.primary_key(), Operator::In, ids)
    }

    async fn write(&self, database: &LogicalDatabase, query: &CompiledQuery) -> DbResult<u64> {
        let pool = database.pool_for(QueryKind::Write, true);
        self.executor.execute(pool, query).await
    }

    async fn read(
        &self,
        database: &LogicalDatabase,
        query: &CompiledQuery,
        force: bool,
    ) -> DbResult<Vec<JsonRow>> {
        let pool = database.pool_for(query.kind, force);
        self.executor.fetch_all(pool, query, &self.schema).await
    }

    /// Column → value map of `entity`. Fields absent from the serialized form
    /// are NULL.
    fn entity_row(&self, entity: &E) -> DbResult<RowData> {
        let mut object = match serde_json::to_value(entity)? {
            JsonValue::Object(object) => object,
            other => {
                return Err(DbError::invalid_input(format!(
                    "{} must serialize to an object, got {}",
                    self.schema.table, other
                )));
            }
        };

        let mut row = RowData::new();
        for column in &self.schema.columns {
            let json = object.remove(&column.field).unwrap_or(JsonValue::Null);
            row.insert(column.column.clone(), json_to_value(json, column.ty, &column.column)?);
        }
        Ok(row)
    }
}

fn deserialize_row<T: DeserializeOwned>(row: JsonRow) -> DbResult<T> {
    serde_json::from_value(JsonValue::Object(row)).map_err(DbError::from)
}

/// Convert a serialized field into a bind value of the column's type.
fn json_to_value(json: JsonValue, ty: ColumnType, column: &str) -> DbResult<Value> {
    let mismatch = |json: &JsonValue| {
        DbError::invalid_input(format!(
            "column {} expects {:?}, got {}",
            column, ty, json
        ))
    };

    if json.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        ColumnType::Int => match &json {
            JsonValue::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| mismatch(&json)),
            JsonValue::Bool(b) => Ok(Value::Int(i64::from(*b))),
            _ => Err(mismatch(&json)),
        },
        ColumnType::Float => json.as_f64().map(Value::Float).ok_or_else(|| mismatch(&json)),
        ColumnType::Bool => match &json {
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
            _ => Err(mismatch(&json)),
        },
        ColumnType::Text => match json {
            JsonValue::String(s) => Ok(Value::Text(s)),
            other => Ok(Value::Text(other.to_string())),
        },
        ColumnType::Timestamp => match &json {
            JsonValue::String(s) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(&json)),
            _ => Err(mismatch(&json)),
        },
        ColumnType::Json => Ok(Value::Json(json)),
        ColumnType::Bytes => match json {
            JsonValue::String(s) => Ok(Value::Bytes(s.into_bytes())),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Bytes)
                .ok_or_else(|| mismatch(&JsonValue::Array(items.clone()))),
            other => Err(mismatch(&other)),
        },
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.naive_local())
        })
}

// =============================================================================
// Audited model
// =============================================================================

/// Model variant that stamps the update time column on map-based updates.
///
/// Every other operation is the plain [`Model`] one, reached through `Deref`.
pub struct AuditedModel<E: Entity> {
    inner: Model<E>,
}

impl<E: Entity> Clone for AuditedModel<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Entity> std::fmt::Debug for AuditedModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuditedModel").field(&self.inner).finish()
    }
}

impl<E: Entity> AuditedModel<E> {
    pub fn new(registry: &Arc<Registry>) -> DbResult<Self> {
        Ok(Self {
            inner: Model::new(registry)?,
        })
    }

    pub fn with_tenant(self, tenant_id: TenantId) -> Self {
        Self {
            inner: self.inner.with_tenant(tenant_id),
        }
    }

    /// Column receiving the update time.
    pub fn updated_time_column(&self) -> &str {
        self.inner
            .schema
            .role_column(ColumnRole::UpdatedAt)
            .map(|c| c.column.as_str())
            .unwrap_or(DEFAULT_UPDATED_TIME_COLUMN)
    }

    pub async fn update_by_conditions(
        &self,
        conditions: Conditions,
        mut data: UpdateData,
    ) -> DbResult<u64> {
        data.insert(
            self.updated_time_column().to_string(),
            Value::Timestamp(local_now()),
        );
        self.inner.update_by_conditions(conditions, data).await
    }

    pub async fn update_by_id(&self, id: i64, data: UpdateData) -> DbResult<u64> {
        let conditions = Conditions::single_eq(self.inner.primary_key(), id);
        self.update_by_conditions(conditions, data).await
    }

    pub async fn update_by_ids(&self, ids: &[i64], data: UpdateData) -> DbResult<u64> {
        let conditions = self.inner.ids_condition(ids);
        self.update_by_conditions(conditions, data).await
    }
}

impl<E: Entity> Deref for AuditedModel<E> {
    type Target = Model<E>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
