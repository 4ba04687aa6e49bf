//! Registry of named logical databases and resolved model schemas.
//!
//! Registration is declarative: a [`RegistryBuilder`] collects database names
//! and model types, and [`RegistryBuilder::init`] opens every pool and
//! resolves every schema at once. The resulting [`Registry`] is immutable.

use crate::config::DatabasesConfig;
use crate::db::pool::LogicalDatabase;
use crate::db::schema::{Entity, EntityDescriptor, ModelSchema, resolve_schema};
use crate::db::tenant::tenant_of;
use crate::error::{DbError, DbResult};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug)]
struct ModelRegistration {
    type_id: TypeId,
    database: String,
    descriptor: EntityDescriptor,
}

/// A model type bound to its base logical database.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub database: String,
    pub schema: Arc<ModelSchema>,
}

/// Collects logical databases and models before startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    databases: Vec<String>,
    models: Vec<ModelRegistration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logical database. Registering a name twice is a no-op.
    pub fn register(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.databases.contains(&name) {
            self.databases.push(name);
        }
        self
    }

    /// Register the model `E` against the logical database `database`.
    ///
    /// The database is registered too. A later registration of the same type
    /// replaces the earlier one.
    pub fn register_model<E: Entity>(mut self, database: impl Into<String>) -> Self {
        let database = database.into();
        let type_id = TypeId::of::<E>();
        self.models.retain(|m| m.type_id != type_id);
        self.models.push(ModelRegistration {
            type_id,
            database: database.clone(),
            descriptor: E::descriptor(),
        });
        self.register(database)
    }

    /// Open every registered database and resolve every model schema.
    ///
    /// The first failure aborts startup; pools opened before it are closed.
    pub async fn init(self, config: &DatabasesConfig) -> DbResult<Registry> {
        let mut databases: HashMap<String, Arc<LogicalDatabase>> = HashMap::new();

        for name in &self.databases {
            let opened = match config.get(name) {
                Some(settings) => LogicalDatabase::open(name, settings).await,
                None => Err(DbError::config(format!(
                    "database '{}' is not configured",
                    name
                ))),
            };
            match opened {
                Ok(database) => {
                    info!(database = %name, driver = %database.driver(), "Database set up");
                    databases.insert(name.clone(), Arc::new(database));
                }
                Err(e) => {
                    error!(database = %name, error = %e, "Database setup failed");
                    close_all(&databases).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = check_tenant_prefixes(&self.models, &databases) {
            error!(error = %e, "Tenant database prefix mismatch");
            close_all(&databases).await;
            return Err(e);
        }

        let mut models = HashMap::new();
        for model in self.models {
            let prefix = databases
                .get(&model.database)
                .map(|db| db.table_prefix().to_string())
                .unwrap_or_default();
            match resolve_schema(&model.descriptor, &prefix) {
                Ok(schema) => {
                    info!(
                        model = model.descriptor.type_name,
                        table = %schema.table,
                        database = %model.database,
                        "Model schema resolved"
                    );
                    models.insert(
                        model.type_id,
                        ModelBinding {
                            database: model.database,
                            schema: Arc::new(schema),
                        },
                    );
                }
                Err(e) => {
                    error!(model = model.descriptor.type_name, error = %e, "Model schema resolution failed");
                    close_all(&databases).await;
                    return Err(e);
                }
            }
        }

        Ok(Registry { databases, models })
    }
}

/// Schemas are resolved once against the base database, so every tenant
/// database of a model's base must share its table prefix.
fn check_tenant_prefixes(
    models: &[ModelRegistration],
    databases: &HashMap<String, Arc<LogicalDatabase>>,
) -> DbResult<()> {
    for model in models {
        let Some(base) = databases.get(&model.database) else {
            continue;
        };
        for (name, database) in databases {
            if tenant_of(&model.database, name).is_some()
                && database.table_prefix() != base.table_prefix()
            {
                return Err(DbError::config(format!(
                    "tenant database '{}' has table prefix '{}' but '{}' uses '{}'",
                    name,
                    database.table_prefix(),
                    model.database,
                    base.table_prefix()
                )));
            }
        }
    }
    Ok(())
}

async fn close_all(databases: &HashMap<String, Arc<LogicalDatabase>>) {
    for database in databases.values() {
        database.close().await;
    }
}

/// Immutable registry of logical databases, shared via `Arc`.
#[derive(Debug)]
pub struct Registry {
    databases: HashMap<String, Arc<LogicalDatabase>>,
    models: HashMap<TypeId, ModelBinding>,
}

impl Registry {
    /// Look up a logical database by name.
    pub fn get_by_name(&self, name: &str) -> DbResult<Arc<LogicalDatabase>> {
        self.databases.get(name).cloned().ok_or_else(|| {
            error!(database = %name, "Database not registered");
            DbError::database_not_found(name)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Binding of the model `E`.
    pub fn binding_for<E: Entity>(&self) -> DbResult<&ModelBinding> {
        self.models.get(&TypeId::of::<E>()).ok_or_else(|| {
            let type_name = E::descriptor().type_name;
            DbError::schema(
                "model was not registered before init",
                type_name,
            )
        })
    }

    /// Resolved schema of the model `E`.
    pub fn schema_for<E: Entity>(&self) -> DbResult<Arc<ModelSchema>> {
        self.binding_for::<E>().map(|binding| Arc::clone(&binding.schema))
    }

    /// Names of all registered databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every primary and replica pool.
    pub async fn close(&self) {
        close_all(&self.databases).await;
        info!("All connections closed");
    }
}
