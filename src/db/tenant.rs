//! Tenant routing.
//!
//! A tenant's data lives in its own logical database, named after the base
//! database and the tenant id. Routing never falls back to the base database.

use crate::db::pool::LogicalDatabase;
use crate::db::registry::Registry;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::warn;

/// Tenant identifier. Zero means single-tenant mode.
pub type TenantId = i64;

/// Logical database name backing `tenant_id` for `base`.
pub fn tenant_database_name(base: &str, tenant_id: TenantId) -> String {
    format!("{}_{}", base, tenant_id)
}

/// Tenant id of `name` when it names a tenant database of `base`.
pub fn tenant_of(base: &str, name: &str) -> Option<TenantId> {
    name.strip_prefix(base)?
        .strip_prefix('_')?
        .parse::<TenantId>()
        .ok()
        .filter(|id| *id != 0)
}

/// Resolves `(tenant, base)` pairs through a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub struct TenantRouter<'a> {
    registry: &'a Registry,
}

impl<'a> TenantRouter<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Database serving `tenant` for the base database `base`.
    pub fn resolve(&self, tenant: Option<TenantId>, base: &str) -> DbResult<Arc<LogicalDatabase>> {
        match tenant {
            None | Some(0) => self.registry.get_by_name(base),
            Some(tenant_id) => {
                let name = tenant_database_name(base, tenant_id);
                if self.registry.contains(&name) {
                    self.registry.get_by_name(&name)
                } else {
                    warn!(tenant_id, database = %name, base = %base, "Tenant database not registered");
                    Err(DbError::tenant_database_not_found(tenant_id, name))
                }
            }
        }
    }
}
