/// Integration tests for the MySQL connection factory
///
/// These tests require a running MySQL server and are ignored by default.
/// Run with: cargo test --test db_pool_tests -- --ignored --test-threads=1
///
/// Connection settings come from the usual environment variables:
/// export DB_HOST=localhost DB_USER=root DB_PASSWORD=secret DB_NAME=fbr_master_test

use sqlx::Row;
use taxbook_shared::db::migrations::ensure_master_database;
use taxbook_shared::db::pool::{
    close_pool, get_pool_stats, health_check, open_pool, ConnectionTarget, DatabaseConfig,
};
use taxbook_shared::error::{is_connectivity_error, TenantError};

fn test_config() -> DatabaseConfig {
    DatabaseConfig::from_env()
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_open_master_pool() {
    let config = test_config();
    ensure_master_database(&config).await.expect("Failed to ensure master database");

    let pool = open_pool(&config, ConnectionTarget::Master)
        .await
        .expect("Failed to open master pool");

    let stats = get_pool_stats(&pool);
    assert!(stats.total_connections > 0, "Authentication should leave a connection open");

    close_pool(&pool).await;
    assert!(pool.is_closed());
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_unknown_database_is_connectivity_error() {
    let config = test_config();

    let err = open_pool(&config, ConnectionTarget::Tenant("tenant_does_not_exist_0"))
        .await
        .expect_err("Unknown database should fail to authenticate");

    assert!(is_connectivity_error(&err));
    assert!(matches!(
        TenantError::from_connect("tenant_does_not_exist_0", err),
        TenantError::Connectivity { .. }
    ));
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_bad_credentials_fail_at_open_not_at_build() {
    let config = DatabaseConfig {
        username: "nobody".to_string(),
        password: "wrong".to_string(),
        acquire_timeout_seconds: 2,
        ..test_config()
    };

    // Building is side-effect free
    let lazy = config.build_pool(ConnectionTarget::Server);
    assert_eq!(lazy.size(), 0);
    lazy.close().await;

    let result = open_pool(&config, ConnectionTarget::Server).await;
    assert!(result.is_err(), "Wrong credentials should be rejected");
}

#[tokio::test]
#[ignore = "requires MySQL"]
async fn test_session_settings() {
    let config = test_config();
    let pool = open_pool(&config, ConnectionTarget::Server)
        .await
        .expect("Failed to open server pool");

    health_check(&pool).await.expect("Health check should succeed");

    let row = sqlx::query("SELECT @@session.time_zone AS tz, @@collation_connection AS coll")
        .fetch_one(&pool)
        .await
        .expect("Failed to read session variables");

    let tz: String = row.get("tz");
    let collation: String = row.get("coll");
    assert_eq!(tz, "+00:00");
    assert_eq!(collation, "utf8mb4_unicode_ci");

    close_pool(&pool).await;
}
