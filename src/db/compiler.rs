//! Query compilation.
//!
//! Translates [`QueryOptions`] and row data into SQL text plus ordered bind
//! parameters for one dialect. Every call builds a fresh [`CompiledQuery`].
//!
//! Column names and RAW fragments are emitted verbatim; only values are bound.

use crate::db::pool::QueryKind;
use crate::db::schema::{ColumnType, ModelSchema};
use crate::error::{DbError, DbResult};
use crate::models::{Condition, Conditions, DriverKind, Operator, QueryOptions, Value};
use std::collections::BTreeMap;

/// Column → value map of the map-based update path.
pub type UpdateData = BTreeMap<String, Value>;

/// Column → value map of one row to insert.
pub type RowData = BTreeMap<String, Value>;

/// SQL text with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: QueryKind,
}

/// Accumulates SQL and parameters, numbering placeholders per dialect.
struct SqlBuilder {
    driver: DriverKind,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    fn new(driver: DriverKind) -> Self {
        Self {
            driver,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Register `value` and return its placeholder.
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.driver {
            DriverKind::Postgres => format!("${}", self.params.len()),
            DriverKind::MySql | DriverKind::Sqlite => "?".to_string(),
        }
    }

    /// Placeholder for a value written into a column of type `ty`.
    ///
    /// PostgreSQL will not assign a text parameter to a non-text column, so
    /// NULLs and text-encoded values (decimal strings, JSON text) are cast to
    /// the column type there.
    fn bind_column(&mut self, value: Value, ty: Option<ColumnType>) -> String {
        let text_like = matches!(value, Value::Null | Value::Text(_));
        let placeholder = self.bind(value);
        match (self.driver, ty.and_then(postgres_type)) {
            (DriverKind::Postgres, Some(pg_type)) if text_like => {
                format!("CAST({} AS {})", placeholder, pg_type)
            }
            _ => placeholder,
        }
    }

    fn push_where(&mut self, conditions: &Conditions) -> DbResult<()> {
        if conditions.is_empty() {
            return Ok(());
        }
        let mut predicates = Vec::with_capacity(conditions.len());
        for condition in conditions {
            predicates.push(self.predicate(condition)?);
        }
        self.push(" WHERE ");
        self.push(&predicates.join(" AND "));
        Ok(())
    }

    fn predicate(&mut self, condition: &Condition) -> DbResult<String> {
        let column = condition.column.as_str();
        if column.is_empty() && condition.op != Operator::Raw {
            return Err(DbError::invalid_input(format!(
                "condition with operator {} has no column",
                condition.op
            )));
        }

        match condition.op {
            Operator::In | Operator::NotIn => {
                let items = condition.value.clone().into_items();
                if items.is_empty() {
                    return Ok("1=0".to_string());
                }
                let placeholders: Vec<String> =
                    items.into_iter().map(|item| self.bind(item)).collect();
                Ok(format!(
                    "{} {} ({})",
                    column,
                    condition.op.as_sql(),
                    placeholders.join(", ")
                ))
            }
            Operator::Null | Operator::NotNull => {
                Ok(format!("{} IS {}", column, condition.op.as_sql()))
            }
            Operator::Is | Operator::IsNot => Ok(format!(
                "{} {} {}",
                column,
                condition.op.as_sql(),
                condition.value.to_sql_literal()
            )),
            Operator::Raw => match &condition.value {
                Value::Text(fragment) if !fragment.trim().is_empty() => {
                    Ok(format!("({})", fragment))
                }
                other => Err(DbError::invalid_input(format!(
                    "RAW condition needs a non-empty text fragment, got {}",
                    other.type_name()
                ))),
            },
            Operator::Eq
            | Operator::Neq
            | Operator::Gt
            | Operator::Lt
            | Operator::Geq
            | Operator::Leq
            | Operator::Like => {
                let placeholder = self.bind(condition.value.clone());
                Ok(format!("{} {} {}", column, condition.op.as_sql(), placeholder))
            }
        }
    }

    fn finish(self, kind: QueryKind) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            params: self.params,
            kind,
        }
    }
}

/// Compiles statements for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler {
    driver: DriverKind,
}

impl QueryCompiler {
    pub fn new(driver: DriverKind) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    /// `SELECT` honoring fields, conditions, groups, orders and pagination.
    ///
    /// No fields selects every schema column; no orders sorts by the primary
    /// key ascending.
    pub fn select(&self, options: &QueryOptions, schema: &ModelSchema) -> DbResult<CompiledQuery> {
        self.build_select(options, schema, false)
    }

    /// Like [`select`](Self::select) but returns at most one row.
    pub fn select_first(
        &self,
        options: &QueryOptions,
        schema: &ModelSchema,
    ) -> DbResult<CompiledQuery> {
        self.build_select(options, schema, true)
    }

    fn build_select(
        &self,
        options: &QueryOptions,
        schema: &ModelSchema,
        first: bool,
    ) -> DbResult<CompiledQuery> {
        let mut builder = SqlBuilder::new(self.driver);
        builder.push("SELECT ");
        builder.push(&select_list(&options.fields, schema));
        builder.push(" FROM ");
        builder.push(&schema.table);
        builder.push_where(&options.conditions)?;

        if !options.groups.is_empty() {
            builder.push(" GROUP BY ");
            builder.push(&options.groups.join(", "));
        }

        builder.push(" ORDER BY ");
        if options.has_order() {
            let orders: Vec<String> = options
                .orders
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect();
            builder.push(&orders.join(", "));
        } else {
            builder.push(&format!("{} ASC", schema.primary_key));
        }

        let limit = if first {
            Some(1)
        } else {
            options.has_pagination().then_some(options.page_size)
        };
        if let Some(limit) = limit {
            builder.push(&format!(" LIMIT {}", limit));
            if let Some(offset) = options.offset().filter(|offset| *offset > 0) {
                builder.push(&format!(" OFFSET {}", offset));
            }
        }

        Ok(builder.finish(QueryKind::Read))
    }

    /// `SELECT COUNT(*)` over the matching rows.
    pub fn count(&self, conditions: &Conditions, schema: &ModelSchema) -> DbResult<CompiledQuery> {
        let mut builder = SqlBuilder::new(self.driver);
        builder.push("SELECT COUNT(*) FROM ");
        builder.push(&schema.table);
        builder.push_where(conditions)?;
        Ok(builder.finish(QueryKind::Read))
    }

    /// Number of distinct `fields` tuples among the matching rows.
    pub fn count_distinct(
        &self,
        fields: &[String],
        conditions: &Conditions,
        schema: &ModelSchema,
    ) -> DbResult<CompiledQuery> {
        let mut builder = SqlBuilder::new(self.driver);
        builder.push("SELECT COUNT(*) FROM (SELECT DISTINCT ");
        builder.push(&select_list(fields, schema));
        builder.push(" FROM ");
        builder.push(&schema.table);
        builder.push_where(conditions)?;
        builder.push(") AS distinct_rows");
        Ok(builder.finish(QueryKind::Read))
    }

    /// Multi-row `INSERT` of every schema column.
    ///
    /// The primary key is left to the database when no row carries one.
    /// Columns missing from a row are inserted as NULL.
    pub fn insert(&self, schema: &ModelSchema, rows: &[RowData]) -> DbResult<CompiledQuery> {
        if rows.is_empty() {
            return Err(DbError::invalid_input("insert requires at least one row"));
        }

        let auto_key = rows.iter().all(|row| {
            row.get(&schema.primary_key)
                .is_none_or(Value::is_zero_key)
        });
        let columns: Vec<(&str, ColumnType)> = schema
            .columns
            .iter()
            .filter(|c| !(auto_key && c.column == schema.primary_key))
            .map(|c| (c.column.as_str(), c.ty))
            .collect();
        if columns.is_empty() {
            return Err(DbError::invalid_input(format!(
                "no insertable columns on {}",
                schema.table
            )));
        }

        let mut builder = SqlBuilder::new(self.driver);
        builder.push(&format!(
            "INSERT INTO {} ({}) VALUES ",
            schema.table,
            columns
                .iter()
                .map(|(column, _)| *column)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let placeholders: Vec<String> = columns
                .iter()
                .map(|(column, ty)| {
                    let value = row.get(*column).cloned().unwrap_or(Value::Null);
                    builder.bind_column(value, Some(*ty))
                })
                .collect();
            tuples.push(format!("({})", placeholders.join(", ")));
        }
        builder.push(&tuples.join(", "));
        Ok(builder.finish(QueryKind::Write))
    }

    /// `UPDATE ... SET ... WHERE ...`; SET parameters precede WHERE parameters.
    pub fn update(
        &self,
        schema: &ModelSchema,
        data: &UpdateData,
        conditions: &Conditions,
    ) -> DbResult<CompiledQuery> {
        if data.is_empty() {
            return Err(DbError::invalid_input(format!(
                "update of {} has no columns to set",
                schema.table
            )));
        }
        if conditions.is_empty() {
            return Err(DbError::dangerous_operation_blocked(
                format!("UPDATE {}", schema.table),
                "Updates without conditions would touch every row",
            ));
        }

        let mut builder = SqlBuilder::new(self.driver);
        let assignments: Vec<String> = data
            .iter()
            .map(|(column, value)| {
                let ty = schema.column(column).map(|c| c.ty);
                format!("{} = {}", column, builder.bind_column(value.clone(), ty))
            })
            .collect();
        builder.push(&format!(
            "UPDATE {} SET {}",
            schema.table,
            assignments.join(", ")
        ));
        builder.push_where(conditions)?;
        Ok(builder.finish(QueryKind::Write))
    }

    /// `DELETE FROM ... WHERE ...`.
    pub fn delete(&self, schema: &ModelSchema, conditions: &Conditions) -> DbResult<CompiledQuery> {
        if conditions.is_empty() {
            return Err(DbError::dangerous_operation_blocked(
                format!("DELETE FROM {}", schema.table),
                "Deletes without conditions would remove every row",
            ));
        }
        let mut builder = SqlBuilder::new(self.driver);
        builder.push("DELETE FROM ");
        builder.push(&schema.table);
        builder.push_where(conditions)?;
        Ok(builder.finish(QueryKind::Write))
    }
}

/// PostgreSQL cast target of a column type; text columns need none.
fn postgres_type(ty: ColumnType) -> Option<&'static str> {
    match ty {
        ColumnType::Int => Some("BIGINT"),
        ColumnType::Float => Some("DOUBLE PRECISION"),
        ColumnType::Bool => Some("BOOLEAN"),
        ColumnType::Timestamp => Some("TIMESTAMP"),
        ColumnType::Json => Some("JSONB"),
        ColumnType::Bytes => Some("BYTEA"),
        ColumnType::Text => None,
    }
}

fn select_list(fields: &[String], schema: &ModelSchema) -> String {
    if fields.is_empty() {
        schema.column_names().join(", ")
    } else {
        fields.join(", ")
    }
}
