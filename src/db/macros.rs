//! Database dispatch macros for reducing code duplication.
//!
//! These macros generate database-specific code from one body while keeping
//! the expanded code linear. They expand at compile time with zero runtime
//! overhead.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// First successful decode of column `$idx` among the listed Rust types,
/// converted with `JsonValue::from`.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $($ty:ty),+ $(,)?) => {{
        let mut decoded: Option<serde_json::Value> = None;
        $(
            if decoded.is_none() {
                if let Ok(v) = $row.try_get::<$ty, _>($idx) {
                    decoded = Some(serde_json::Value::from(v));
                }
            }
        )+
        decoded
    }};
}

/// Implements `RowToJson` for a database-specific row type.
///
/// Schema columns decode by their declared [`ColumnType`](crate::db::schema::ColumnType)
/// and are keyed by field name; other columns decode by the reported
/// database type and keep their column name.
macro_rules! impl_row_to_json {
    ($row:ty) => {
        impl $crate::db::types::RowToJson for $row {
            fn to_json_map(
                &self,
                schema: &$crate::db::schema::ModelSchema,
            ) -> serde_json::Map<String, serde_json::Value> {
                use $crate::db::schema::ColumnType;
                use $crate::db::types::{categorize_type, format_timestamp};
                use chrono::{DateTime, NaiveDateTime, Utc};
                use serde_json::Value as JsonValue;
                use sqlx::types::Json;
                use sqlx::{Column, Row, TypeInfo, ValueRef};

                let decode = |idx: usize, ty: Option<ColumnType>| -> JsonValue {
                    match self.try_get_raw(idx) {
                        Ok(raw) if !raw.is_null() => {}
                        _ => return JsonValue::Null,
                    }
                    let decoded = match ty {
                        Some(ColumnType::Int) => first_decoded!(self, idx, i64, i32, i16),
                        Some(ColumnType::Float) => first_decoded!(self, idx, f64, f32).or_else(|| {
                            self.try_get::<String, _>(idx)
                                .ok()
                                .and_then(|s| s.parse::<f64>().ok())
                                .map(JsonValue::from)
                        }),
                        Some(ColumnType::Bool) => first_decoded!(self, idx, bool).or_else(|| {
                            self.try_get::<i64, _>(idx).ok().map(|v| JsonValue::Bool(v != 0))
                        }),
                        Some(ColumnType::Timestamp) => self
                            .try_get::<NaiveDateTime, _>(idx)
                            .or_else(|_| {
                                self.try_get::<DateTime<Utc>, _>(idx).map(|t| t.naive_utc())
                            })
                            .ok()
                            .map(|t| JsonValue::String(format_timestamp(&t))),
                        Some(ColumnType::Json) => self
                            .try_get::<Json<JsonValue>, _>(idx)
                            .map(|json| json.0)
                            .ok()
                            .or_else(|| {
                                self.try_get::<String, _>(idx).ok().map(|s| {
                                    serde_json::from_str(&s).unwrap_or(JsonValue::String(s))
                                })
                            }),
                        Some(ColumnType::Bytes) => first_decoded!(self, idx, Vec<u8>),
                        Some(ColumnType::Text) => first_decoded!(self, idx, String),
                        None => first_decoded!(self, idx, i64, f64, bool, String),
                    };
                    decoded
                        .or_else(|| first_decoded!(self, idx, String))
                        .unwrap_or_else(|| {
                            tracing::warn!(column = idx, "Failed to decode column");
                            JsonValue::Null
                        })
                };

                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| match schema.column(col.name()) {
                        Some(column) => (column.field.clone(), decode(idx, Some(column.ty))),
                        None => {
                            let ty = categorize_type(col.type_info().name());
                            (col.name().to_string(), decode(idx, ty))
                        }
                    })
                    .collect()
            }
        }
    };
}
