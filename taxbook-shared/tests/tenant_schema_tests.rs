/// Tenant schema and end-to-end provisioning tests against MySQL
///
/// These tests create and drop throwaway databases, so they need a user with
/// CREATE/DROP privileges. Ignored by default.
/// Run with: cargo test --test tenant_schema_tests -- --ignored --test-threads=1

use std::sync::Arc;
use taxbook_shared::db::migrations::{ensure_master_database, run_migrations};
use taxbook_shared::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
use taxbook_shared::error::TenantError;
use taxbook_shared::models::tenant::{CreateTenant, ProvisioningState};
use taxbook_shared::schema::buyer_index::{load_indexes, TAX_ID_COLUMN};
use taxbook_shared::schema::{initialize_tenant_schema, latest_version};
use taxbook_shared::tenancy::naming::generate_database_name;
use taxbook_shared::tenancy::{MySqlDatabaseProvider, MySqlTenantManager, MySqlTenantRegistry};

async fn scratch_database(config: &DatabaseConfig, label: &str) -> (String, sqlx::MySqlPool) {
    let name = generate_database_name(label);

    let server = open_pool(config, ConnectionTarget::Server)
        .await
        .expect("Failed to open server pool");
    sqlx::query(&format!("CREATE DATABASE `{}`", name))
        .execute(&server)
        .await
        .expect("Failed to create scratch database");
    server.close().await;

    let pool = open_pool(config, ConnectionTarget::Tenant(&name))
        .await
        .expect("Failed to open scratch pool");

    (name, pool)
}

async fn drop_database(config: &DatabaseConfig, name: &str) {
    let server = open_pool(config, ConnectionTarget::Server)
        .await
        .expect("Failed to open server pool");
    sqlx::query(&format!("DROP DATABASE IF EXISTS `{}`", name))
        .execute(&server)
        .await
        .ok();
    server.close().await;
}

async fn table_and_column_count(pool: &sqlx::MySqlPool) -> (i64, i64) {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    let columns: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE()",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    (tables, columns)
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_initializer_is_idempotent() {
    let config = DatabaseConfig::from_env();
    let (name, pool) = scratch_database(&config, "schema-idem").await;

    let first = initialize_tenant_schema(&pool).await.unwrap();
    assert!(first.is_complete(), "warnings: {:?}", first.warnings);
    assert_eq!(first.applied.len() as u32, latest_version());

    let shape = table_and_column_count(&pool).await;
    let indexes = load_indexes(&pool, "buyers").await.unwrap();

    let second = initialize_tenant_schema(&pool).await.unwrap();
    assert!(second.applied.is_empty());
    assert!(second.warnings.is_empty());
    assert_eq!(table_and_column_count(&pool).await, shape);
    assert_eq!(load_indexes(&pool, "buyers").await.unwrap().len(), indexes.len());

    pool.close().await;
    drop_database(&config, &name).await;
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_legacy_unique_buyer_index_is_repaired() {
    let config = DatabaseConfig::from_env();
    let (name, pool) = scratch_database(&config, "schema-legacy").await;

    // Shape produced by older releases
    sqlx::query(
        r#"
        CREATE TABLE buyers (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            buyer_ntn_cnic VARCHAR(50) NOT NULL,
            buyer_business_name VARCHAR(255) NOT NULL,
            buyer_province VARCHAR(100) NULL,
            buyer_address TEXT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY buyer_ntn_cnic (buyer_ntn_cnic)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let report = initialize_tenant_schema(&pool).await.unwrap();
    assert!(report.is_complete(), "warnings: {:?}", report.warnings);

    let indexes = load_indexes(&pool, "buyers").await.unwrap();
    let on_tax_id: Vec<_> = indexes
        .iter()
        .filter(|i| i.columns.iter().any(|c| c == TAX_ID_COLUMN))
        .collect();

    assert!(on_tax_id.iter().all(|i| !i.unique), "unique index left: {:?}", on_tax_id);
    assert!(on_tax_id.iter().any(|i| i.columns.len() == 1));

    // Duplicate buyer tax ids are now accepted
    for _ in 0..2 {
        sqlx::query("INSERT INTO buyers (buyer_ntn_cnic, buyer_business_name) VALUES ('1234567-8', 'Dup')")
            .execute(&pool)
            .await
            .unwrap();
    }

    pool.close().await;
    drop_database(&config, &name).await;
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_create_and_resolve_end_to_end() {
    let config = DatabaseConfig::from_env();
    ensure_master_database(&config).await.unwrap();
    let master = open_pool(&config, ConnectionTarget::Master).await.unwrap();
    run_migrations(&master).await.unwrap();

    let manager = MySqlTenantManager::new(
        Arc::new(MySqlTenantRegistry::new(master.clone())),
        Arc::new(MySqlDatabaseProvider::new(config.clone())),
    );

    let tax_id = format!("E2E-{}", chrono::Utc::now().timestamp_millis());
    let input = CreateTenant {
        seller_ntn_cnic: tax_id.clone(),
        seller_business_name: "Acme".to_string(),
        seller_province: Some("Sindh".to_string()),
        seller_address: None,
        database_name: None,
    };

    let created = manager.create(input.clone()).await.unwrap();
    assert_eq!(created.tenant.provisioning_state, ProvisioningState::SchemaReady);

    let by_id = manager.resolve(&created.tenant.tenant_id).await.unwrap();
    let by_name = manager
        .resolve_by_database_name(&created.database_name)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&by_id.handle, &by_name.handle));
    assert_eq!(by_id.handle.models.buyers.count().await.unwrap(), 0);

    assert!(matches!(
        manager.create(input).await,
        Err(TenantError::DuplicateTenant(_))
    ));

    assert!(manager.close_all().await >= 1);
    let reopened = manager.resolve(&created.tenant.tenant_id).await.unwrap();
    assert!(!Arc::ptr_eq(&by_id.handle, &reopened.handle));
    manager.close_all().await;

    sqlx::query("DELETE FROM tenants WHERE tenant_id = ?")
        .bind(&created.tenant.tenant_id)
        .execute(&master)
        .await
        .unwrap();
    drop_database(&config, &created.database_name).await;
    master.close().await;
}
