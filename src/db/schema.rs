//! Model schema resolution.
//!
//! Entities describe their persisted fields with a static [`EntityDescriptor`].
//! The registry resolves each descriptor into a [`ModelSchema`] once, during
//! `init`, and shares it read-only afterwards.

use crate::error::{DbError, DbResult};
use chrono::NaiveDateTime;
use convert_case::{Case, Casing};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Logical type of a persisted column. Drives bind and decode conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
    Json,
    Bytes,
}

/// Special meaning attached to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnRole {
    #[default]
    Plain,
    PrimaryKey,
    /// Stamped with the current time on insert when unset
    CreatedAt,
    /// Stamped with the current time on insert and typed saves
    UpdatedAt,
}

/// Declaration of one persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Serde key of the field
    pub field: &'static str,
    /// Explicit column name; defaults to the snake_case field name
    pub column: Option<&'static str>,
    pub ty: ColumnType,
    pub role: ColumnRole,
}

impl ColumnDef {
    pub const fn new(field: &'static str, ty: ColumnType) -> Self {
        Self {
            field,
            column: None,
            ty,
            role: ColumnRole::Plain,
        }
    }

    pub const fn named(self, column: &'static str) -> Self {
        Self {
            column: Some(column),
            ..self
        }
    }

    pub const fn primary_key(self) -> Self {
        Self {
            role: ColumnRole::PrimaryKey,
            ..self
        }
    }

    pub const fn created_at(self) -> Self {
        Self {
            role: ColumnRole::CreatedAt,
            ..self
        }
    }

    pub const fn updated_at(self) -> Self {
        Self {
            role: ColumnRole::UpdatedAt,
            ..self
        }
    }
}

/// A persisted field or an embedded group of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Column(ColumnDef),
    Embed(&'static [Field]),
}

/// Static description of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub type_name: &'static str,
    /// Explicit table name, used verbatim
    pub table: Option<&'static str>,
    pub fields: &'static [Field],
}

impl EntityDescriptor {
    pub const fn new(type_name: &'static str, fields: &'static [Field]) -> Self {
        Self {
            type_name,
            table: None,
            fields,
        }
    }

    /// Use `table` verbatim instead of the derived name.
    ///
    /// The derived name only strips regular English plural endings, so
    /// irregular nouns ("News", "Series", "People") need an explicit table.
    pub const fn with_table(self, table: &'static str) -> Self {
        Self {
            table: Some(table),
            ..self
        }
    }
}

/// A persisted type.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Order {
///     #[serde(flatten)]
///     base: InsertableEntity,
///     amount: f64,
/// }
///
/// impl Entity for Order {
///     fn descriptor() -> EntityDescriptor {
///         const FIELDS: &[Field] = &[
///             Field::Embed(INSERTABLE_FIELDS),
///             Field::Column(ColumnDef::new("amount", ColumnType::Float)),
///         ];
///         EntityDescriptor::new("Order", FIELDS)
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn descriptor() -> EntityDescriptor;
}

// =============================================================================
// Base field groups
// =============================================================================

pub const BASE_FIELDS: &[Field] =
    &[Field::Column(ColumnDef::new("id", ColumnType::Int).primary_key())];

pub const INSERTABLE_FIELDS: &[Field] = &[
    Field::Embed(BASE_FIELDS),
    Field::Column(ColumnDef::new("created_at", ColumnType::Timestamp).created_at()),
];

pub const UPDATABLE_FIELDS: &[Field] = &[
    Field::Embed(INSERTABLE_FIELDS),
    Field::Column(ColumnDef::new("created_by", ColumnType::Int)),
    Field::Column(ColumnDef::new("updated_by", ColumnType::Int)),
    Field::Column(ColumnDef::new("updated_at", ColumnType::Timestamp).updated_at()),
];

/// Auto-increment key. Embed with `#[serde(flatten)]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseEntity {
    #[serde(default)]
    pub id: i64,
}

/// Key plus creation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertableEntity {
    #[serde(flatten)]
    pub base: BaseEntity,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Key, creation time and update audit columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatableEntity {
    #[serde(flatten)]
    pub insertable: InsertableEntity,
    #[serde(default)]
    pub created_by: i64,
    #[serde(default)]
    pub updated_by: i64,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

// =============================================================================
// Resolution
// =============================================================================

/// A resolved persisted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub field: String,
    pub column: String,
    pub ty: ColumnType,
    pub role: ColumnRole,
}

/// Table name, primary key and ordered columns of a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnSchema>,
}

impl ModelSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column.clone()).collect()
    }

    pub fn column(&self, column: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.column == column)
    }

    pub fn by_field(&self, field: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// First column carrying `role`.
    pub fn role_column(&self, role: ColumnRole) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.role == role)
    }
}

/// Resolve `descriptor` into a [`ModelSchema`].
///
/// The derived table name is prefixed with `table_prefix`; an explicit table
/// name is used as is.
pub fn resolve_schema(descriptor: &EntityDescriptor, table_prefix: &str) -> DbResult<ModelSchema> {
    let table = match descriptor.table {
        Some(table) => table.to_string(),
        None => format!("{}{}", table_prefix, table_name(descriptor.type_name)),
    };

    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    flatten_fields(descriptor.fields, &mut columns, &mut seen, descriptor.type_name)?;

    let primary_key = columns
        .iter()
        .find(|c| c.role == ColumnRole::PrimaryKey)
        .map(|c| c.column.clone())
        .ok_or_else(|| {
            DbError::config(format!(
                "model {} declares no primary key column",
                descriptor.type_name
            ))
        })?;

    Ok(ModelSchema {
        table,
        primary_key,
        columns,
    })
}

fn flatten_fields(
    fields: &[Field],
    columns: &mut Vec<ColumnSchema>,
    seen: &mut HashSet<String>,
    type_name: &str,
) -> DbResult<()> {
    for field in fields {
        match field {
            Field::Column(def) => {
                let column = def
                    .column
                    .map(str::to_string)
                    .unwrap_or_else(|| def.field.to_case(Case::Snake));
                if !seen.insert(column.clone()) {
                    return Err(DbError::config(format!(
                        "model {} declares column '{}' more than once",
                        type_name, column
                    )));
                }
                columns.push(ColumnSchema {
                    field: def.field.to_string(),
                    column,
                    ty: def.ty,
                    role: def.role,
                });
            }
            Field::Embed(group) => flatten_fields(group, columns, seen, type_name)?,
        }
    }
    Ok(())
}

/// Singular snake_case table name of a type name.
///
/// Suffix rules only; see [`EntityDescriptor::with_table`] for irregular nouns.
fn table_name(type_name: &str) -> String {
    let base = type_name.rsplit("::").next().unwrap_or(type_name);
    let snake = base.to_case(Case::Snake);
    match snake.rsplit_once('_') {
        Some((head, last)) => format!("{}_{}", head, singularize(last)),
        None => singularize(&snake),
    }
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.len() > 1 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_FIELDS: &[Field] = &[
        Field::Embed(UPDATABLE_FIELDS),
        Field::Column(ColumnDef::new("displayName", ColumnType::Text)),
        Field::Column(ColumnDef::new("email", ColumnType::Text).named("email_address")),
    ];

    #[test]
    fn test_table_name_derivation() {
        assert_eq!(table_name("User"), "user");
        assert_eq!(table_name("OrderItems"), "order_item");
        assert_eq!(table_name("Categories"), "category");
        assert_eq!(table_name("Boxes"), "box");
        assert_eq!(table_name("Address"), "address");
        assert_eq!(table_name("Status"), "status");
        assert_eq!(table_name("crate::models::UserProfile"), "user_profile");
    }

    #[test]
    fn test_resolve_flattens_embedded_groups() {
        let schema = resolve_schema(&EntityDescriptor::new("User", USER_FIELDS), "t_").unwrap();
        assert_eq!(schema.table, "t_user");
        assert_eq!(schema.primary_key, "id");
        assert_eq!(
            schema.column_names(),
            vec![
                "id",
                "created_at",
                "created_by",
                "updated_by",
                "updated_at",
                "display_name",
                "email_address"
            ]
        );
        assert_eq!(
            schema.role_column(ColumnRole::UpdatedAt).unwrap().column,
            "updated_at"
        );
        assert_eq!(schema.by_field("email").unwrap().column, "email_address");
    }

    #[test]
    fn test_explicit_table_ignores_prefix() {
        let descriptor = EntityDescriptor::new("User", USER_FIELDS).with_table("accounts");
        let schema = resolve_schema(&descriptor, "t_").unwrap();
        assert_eq!(schema.table, "accounts");
    }

    #[test]
    fn test_missing_primary_key_is_config_error() {
        const FIELDS: &[Field] = &[Field::Column(ColumnDef::new("name", ColumnType::Text))];
        let err = resolve_schema(&EntityDescriptor::new("Tag", FIELDS), "").unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_first_primary_key_wins() {
        const FIELDS: &[Field] = &[
            Field::Column(ColumnDef::new("code", ColumnType::Text).primary_key()),
            Field::Column(ColumnDef::new("id", ColumnType::Int).primary_key()),
        ];
        let schema = resolve_schema(&EntityDescriptor::new("Country", FIELDS), "").unwrap();
        assert_eq!(schema.primary_key, "code");
    }

    #[test]
    fn test_duplicate_column_rejected() {
        const FIELDS: &[Field] = &[
            Field::Embed(BASE_FIELDS),
            Field::Column(ColumnDef::new("id", ColumnType::Int)),
        ];
        let err = resolve_schema(&EntityDescriptor::new("Dup", FIELDS), "").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_base_entities_flatten() {
        let entity = UpdatableEntity {
            insertable: InsertableEntity {
                base: BaseEntity { id: 3 },
                created_at: None,
            },
            created_by: 1,
            updated_by: 2,
            updated_at: None,
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["created_by"], 1);
        assert!(json["updated_at"].is_null());
    }
}
