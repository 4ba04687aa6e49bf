//! Service foundation library.
//!
//! Declarative registration of named logical databases (SQLite, PostgreSQL,
//! MySQL) with primary/replica routing, per-tenant database resolution and a
//! typed CRUD model layer on top of sqlx.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseSettings, DatabasesConfig};
pub use db::{AuditedModel, Entity, Model, Registry, RegistryBuilder};
pub use error::{DbError, DbResult};
