mod common;

use common::{MEMBER_DDL, Member, sqlite_config, sqlite_pool, sqlite_settings};
use std::sync::Arc;
use svc_foundation::config::DatabasesConfig;
use svc_foundation::db::{Model, QueryKind, RegistryBuilder, Route, TenantRouter};
use svc_foundation::error::DbError;
use svc_foundation::models::{ConnectionDescriptor, QueryOptions};
use tempfile::TempDir;

async fn seed(pool: &sqlx::SqlitePool, name: &str) {
    sqlx::query(MEMBER_DDL).execute(pool).await.unwrap();
    sqlx::query("INSERT INTO member (name, age) VALUES (?, 1)")
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reads_go_to_replica_when_separated() {
    let dir = TempDir::new().unwrap();
    let replica = dir.path().join("replica.db");
    let settings = sqlite_settings(&dir, "primary.db")
        .with_replica(ConnectionDescriptor::sqlite(replica.to_string_lossy()));
    let config = DatabasesConfig::new().with("main", settings);

    let registry = Arc::new(
        RegistryBuilder::new()
            .register_model::<Member>("main")
            .init(&config)
            .await
            .unwrap(),
    );
    let db = registry.get_by_name("main").unwrap();
    assert!(db.has_replica());
    assert_eq!(db.route(QueryKind::Read, false), Route::Replica);
    assert_eq!(db.route(QueryKind::Read, true), Route::Primary);
    assert_eq!(db.route(QueryKind::Write, false), Route::Primary);

    seed(sqlite_pool(db.primary()), "on-primary").await;
    seed(sqlite_pool(db.replica().unwrap()), "on-replica").await;

    let members = Model::<Member>::new(&registry).unwrap();
    let read = members.find_one(QueryOptions::new()).await.unwrap();
    assert_eq!(read.name, "on-replica");

    let forced = members
        .find_one(QueryOptions::new().with_master(true))
        .await
        .unwrap();
    assert_eq!(forced.name, "on-primary");

    members.insert(&Member::new("written", 2)).await.unwrap();
    let written: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM member WHERE name = 'written'")
        .fetch_one(sqlite_pool(db.primary()))
        .await
        .unwrap();
    assert_eq!(written.0, 1);

    registry.close().await;
}

#[tokio::test]
async fn test_reads_use_primary_without_separation() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir, &["main"]);
    let registry = Arc::new(
        RegistryBuilder::new()
            .register_model::<Member>("main")
            .init(&config)
            .await
            .unwrap(),
    );
    let db = registry.get_by_name("main").unwrap();
    assert!(!db.has_replica());
    assert_eq!(db.route(QueryKind::Read, false), Route::Primary);

    seed(sqlite_pool(db.primary()), "only").await;
    let members = Model::<Member>::new(&registry).unwrap();
    assert_eq!(members.find_one(QueryOptions::new()).await.unwrap().name, "only");
}

#[tokio::test]
async fn test_pool_limits_follow_pool_size() {
    let dir = TempDir::new().unwrap();
    let config = DatabasesConfig::new().with("main", sqlite_settings(&dir, "main.db").with_pool_size(50));
    let registry = RegistryBuilder::new().register("main").init(&config).await.unwrap();

    let db = registry.get_by_name("main").unwrap();
    assert_eq!(db.limits().max_open, 50);
    assert_eq!(db.limits().max_idle, 25);
    assert_eq!(db.primary().max_connections(), 50);
    registry.close().await;
    assert!(db.primary().is_closed());
}

#[tokio::test]
async fn test_separation_without_replica_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut settings = sqlite_settings(&dir, "main.db");
    settings.separation = true;
    let config = DatabasesConfig::new().with("main", settings);

    let err = RegistryBuilder::new().register("main").init(&config).await.unwrap_err();
    assert!(matches!(err, DbError::Config { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_tenant_resolution() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir, &["orders", "orders_7", "orders_8"]);
    let registry = RegistryBuilder::new()
        .register("orders")
        .register("orders_7")
        .register("orders_8")
        .init(&config)
        .await
        .unwrap();
    let router = TenantRouter::new(&registry);

    let base = router.resolve(None, "orders").unwrap();
    let zero = router.resolve(Some(0), "orders").unwrap();
    assert!(Arc::ptr_eq(&base, &zero));

    let seven = router.resolve(Some(7), "orders").unwrap();
    let eight = router.resolve(Some(8), "orders").unwrap();
    assert_eq!(seven.name(), "orders_7");
    assert!(!Arc::ptr_eq(&seven, &eight));
    assert!(!Arc::ptr_eq(&seven, &base));

    let err = router.resolve(Some(9), "orders").unwrap_err();
    assert!(matches!(err, DbError::TenantDatabaseNotFound { tenant_id: 9, .. }));
    registry.close().await;
}

#[tokio::test]
async fn test_tenant_models_are_isolated() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir, &["crm", "crm_1", "crm_2"]);
    let registry = Arc::new(
        RegistryBuilder::new()
            .register_model::<Member>("crm")
            .register("crm_1")
            .register("crm_2")
            .init(&config)
            .await
            .unwrap(),
    );
    for name in ["crm", "crm_1", "crm_2"] {
        let db = registry.get_by_name(name).unwrap();
        sqlx::query(MEMBER_DDL)
            .execute(sqlite_pool(db.primary()))
            .await
            .unwrap();
    }

    let tenant_one = Model::<Member>::new(&registry).unwrap().with_tenant(1);
    let tenant_two = Model::<Member>::new(&registry).unwrap().with_tenant(2);
    assert!(tenant_one.is_multi_tenant());
    assert_eq!(tenant_one.tenant_id(), Some(1));

    tenant_one.insert(&Member::new("one", 1)).await.unwrap();
    tenant_one.insert(&Member::new("uno", 1)).await.unwrap();
    tenant_two.insert(&Member::new("two", 2)).await.unwrap();

    let none = svc_foundation::models::Conditions::new();
    assert_eq!(tenant_one.count(none.clone()).await.unwrap(), 2);
    assert_eq!(tenant_two.count(none.clone()).await.unwrap(), 1);

    let base = Model::<Member>::new(&registry).unwrap().with_tenant(0);
    assert!(!base.is_multi_tenant());
    assert_eq!(base.count(none.clone()).await.unwrap(), 0);

    let missing = Model::<Member>::new(&registry).unwrap().with_tenant(3);
    let err = missing.count(none).await.unwrap_err();
    assert!(matches!(err, DbError::TenantDatabaseNotFound { .. }));
}
