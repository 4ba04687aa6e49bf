//! Database-agnostic type mappings.
//!
//! Rows are converted to JSON maps keyed by entity field names, which serde
//! then deserializes into entity or projection types.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. The column's [`ColumnType`] comes from the model schema, or from
//!    [`categorize_type`] for columns the schema does not know
//! 2. The row type's generated decoder extracts the value, trying the
//!    compatible Rust types in order

use crate::db::schema::{ColumnType, ModelSchema};
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;

/// Format used for timestamps in decoded rows; chrono's serde accepts it.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Classify a database type name into a column type.
///
/// Returns `None` when the name says nothing useful, e.g. SQLite expression
/// columns reported as NULL.
pub fn categorize_type(type_name: &str) -> Option<ColumnType> {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        return Some(ColumnType::Float);
    }

    if lower == "bool" || lower == "boolean" {
        return Some(ColumnType::Bool);
    }

    if lower.contains("int") || lower.contains("serial") {
        return Some(ColumnType::Int);
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return Some(ColumnType::Float);
    }

    if lower == "json" || lower == "jsonb" {
        return Some(ColumnType::Json);
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return Some(ColumnType::Bytes);
    }

    if lower.contains("timestamp") || lower == "datetime" {
        return Some(ColumnType::Timestamp);
    }

    if lower.contains("char") || lower.contains("text") || lower == "uuid" {
        return Some(ColumnType::Text);
    }

    None
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self, schema: &ModelSchema) -> serde_json::Map<String, JsonValue>;
}

impl_row_to_json!(MySqlRow);
impl_row_to_json!(PgRow);
impl_row_to_json!(SqliteRow);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), Some(ColumnType::Int));
        assert_eq!(categorize_type("BIGINT"), Some(ColumnType::Int));
        assert_eq!(categorize_type("INT8"), Some(ColumnType::Int));
        assert_eq!(categorize_type("SERIAL"), Some(ColumnType::Int));
        assert_eq!(categorize_type("INTEGER"), Some(ColumnType::Int));
    }

    #[test]
    fn test_categorize_type_float() {
        assert_eq!(categorize_type("DOUBLE"), Some(ColumnType::Float));
        assert_eq!(categorize_type("REAL"), Some(ColumnType::Float));
        assert_eq!(categorize_type("NUMERIC"), Some(ColumnType::Float));
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(categorize_type("jsonb"), Some(ColumnType::Json));
        assert_eq!(categorize_type("BOOLEAN"), Some(ColumnType::Bool));
        assert_eq!(categorize_type("TIMESTAMPTZ"), Some(ColumnType::Timestamp));
        assert_eq!(categorize_type("VARCHAR"), Some(ColumnType::Text));
        assert_eq!(categorize_type("BLOB"), Some(ColumnType::Bytes));
        assert_eq!(categorize_type("NULL"), None);
    }

    #[test]
    fn test_format_timestamp_parses_back() {
        let t = NaiveDateTime::parse_from_str("2024-03-01 10:20:30.5", "%Y-%m-%d %H:%M:%S%.f")
            .unwrap();
        let formatted = format_timestamp(&t);
        assert_eq!(formatted, "2024-03-01T10:20:30.500");
        let back: NaiveDateTime = serde_json::from_value(JsonValue::String(formatted)).unwrap();
        assert_eq!(back, t);
    }
}
