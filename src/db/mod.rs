//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Logical databases with primary/replica pools
//! - Registry and tenant routing
//! - Model schema resolution
//! - Query compilation and execution
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod compiler;
pub mod executor;
pub mod model;
mod params;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod tenant;
pub mod types;

pub use compiler::{CompiledQuery, QueryCompiler, RowData, UpdateData};
pub use executor::{JsonRow, QueryExecutor};
pub use model::{AuditedModel, Model};
pub use pool::{DbPool, LogicalDatabase, PoolLimits, QueryKind, Route};
pub use registry::{ModelBinding, Registry, RegistryBuilder};
pub use schema::{
    BASE_FIELDS, BaseEntity, ColumnDef, ColumnRole, ColumnSchema, ColumnType, Entity,
    EntityDescriptor, Field, INSERTABLE_FIELDS, InsertableEntity, ModelSchema, UPDATABLE_FIELDS,
    UpdatableEntity,
};
pub use tenant::{TenantId, TenantRouter};
