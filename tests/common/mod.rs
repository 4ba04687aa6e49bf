#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use svc_foundation::config::{DatabaseSettings, DatabasesConfig};
use svc_foundation::db::pool::DbPool;
use svc_foundation::db::{
    ColumnDef, ColumnType, Entity, EntityDescriptor, Field, INSERTABLE_FIELDS, InsertableEntity,
    Registry, UPDATABLE_FIELDS, UpdatableEntity,
};
use svc_foundation::models::ConnectionDescriptor;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(flatten)]
    pub base: InsertableEntity,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: i64,
}

impl Member {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Self::default()
        }
    }

    pub fn with_id(id: i64, name: &str, age: i64) -> Self {
        let mut member = Self::new(name, age);
        member.base.base.id = id;
        member
    }

    pub fn id(&self) -> i64 {
        self.base.base.id
    }
}

impl Entity for Member {
    fn descriptor() -> EntityDescriptor {
        const FIELDS: &[Field] = &[
            Field::Embed(INSERTABLE_FIELDS),
            Field::Column(ColumnDef::new("name", ColumnType::Text)),
            Field::Column(ColumnDef::new("age", ColumnType::Int)),
        ];
        EntityDescriptor::new("Member", FIELDS)
    }
}

pub const MEMBER_DDL: &str = "CREATE TABLE IF NOT EXISTS member (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at DATETIME,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0
)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(flatten)]
    pub base: UpdatableEntity,
    #[serde(default)]
    pub title: String,
}

impl Article {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> i64 {
        self.base.insertable.base.id
    }
}

impl Entity for Article {
    fn descriptor() -> EntityDescriptor {
        const FIELDS: &[Field] = &[
            Field::Embed(UPDATABLE_FIELDS),
            Field::Column(ColumnDef::new("title", ColumnType::Text)),
        ];
        EntityDescriptor::new("Article", FIELDS)
    }
}

pub const ARTICLE_DDL: &str = "CREATE TABLE IF NOT EXISTS article (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at DATETIME,
    created_by INTEGER NOT NULL DEFAULT 0,
    updated_by INTEGER NOT NULL DEFAULT 0,
    updated_at DATETIME,
    title TEXT NOT NULL
)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(flatten)]
    pub base: InsertableEntity,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub attrs: JsonValue,
}

impl Product {
    pub fn id(&self) -> i64 {
        self.base.base.id
    }
}

impl Entity for Product {
    fn descriptor() -> EntityDescriptor {
        const FIELDS: &[Field] = &[
            Field::Embed(INSERTABLE_FIELDS),
            Field::Column(ColumnDef::new("name", ColumnType::Text)),
            Field::Column(ColumnDef::new("price", ColumnType::Float)),
            Field::Column(ColumnDef::new("stock", ColumnType::Int)),
            Field::Column(ColumnDef::new("attrs", ColumnType::Json)),
        ];
        EntityDescriptor::new("Product", FIELDS)
    }
}

pub const PRODUCT_DDL: &str = "CREATE TABLE IF NOT EXISTS product (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at DATETIME,
    name TEXT NOT NULL,
    price REAL NOT NULL,
    stock INTEGER,
    attrs TEXT NOT NULL
)";

/// SQLite settings for a file named `file` inside `dir`.
pub fn sqlite_settings(dir: &TempDir, file: &str) -> DatabaseSettings {
    let path = dir.path().join(file);
    DatabaseSettings::new("sqlite", ConnectionDescriptor::sqlite(path.to_string_lossy()))
}

/// One SQLite database per name, each in its own file.
pub fn sqlite_config(dir: &TempDir, names: &[&str]) -> DatabasesConfig {
    let mut config = DatabasesConfig::new();
    for name in names {
        config.insert(*name, sqlite_settings(dir, &format!("{}.db", name)));
    }
    config
}

pub fn sqlite_pool(pool: &DbPool) -> &sqlx::SqlitePool {
    match pool {
        DbPool::SQLite(pool) => pool,
        other => panic!("expected SQLite pool, got {:?}", other.driver()),
    }
}

/// Run `ddl` on the primary of `database`.
pub async fn create_table(registry: &Registry, database: &str, ddl: &str) {
    let db = registry.get_by_name(database).unwrap();
    sqlx::query(ddl)
        .execute(sqlite_pool(db.primary()))
        .await
        .unwrap();
}
