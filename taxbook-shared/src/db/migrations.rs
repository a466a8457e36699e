/// Master database migration runner
///
/// The master database holds the tenant registry plus users, roles,
/// permissions and audit tables. Its schema is managed with sqlx's embedded
/// migrations from `taxbook-shared/migrations/`.
///
/// Tenant databases are *not* migrated here; see [`crate::schema`].
///
/// # Example
///
/// ```no_run
/// use taxbook_shared::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
/// use taxbook_shared::db::migrations::{ensure_master_database, run_migrations, get_migration_status};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env();
///
///     ensure_master_database(&config).await?;
///     let pool = open_pool(&config, ConnectionTarget::Master).await?;
///
///     run_migrations(&pool).await?;
///
///     let status = get_migration_status(&pool).await?;
///     println!("Applied {} migrations", status.applied_migrations);
///
///     Ok(())
/// }
/// ```

use crate::db::pool::{ConnectionTarget, DatabaseConfig};
use crate::tenancy::naming::quote_identifier;
use sqlx::mysql::MySqlPool;
use tracing::{debug, info, warn};

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Number of migrations that have been applied
    pub applied_migrations: usize,

    /// Latest applied migration version (timestamp)
    pub latest_version: Option<i64>,

    /// Whether every embedded migration has been applied
    pub is_up_to_date: bool,
}

/// Runs all pending master migrations
///
/// # Errors
///
/// Returns an error if a migration fails to execute or a previously applied
/// migration was modified.
pub async fn run_migrations(pool: &MySqlPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting master database migrations");

    let migrations = sqlx::migrate!("./migrations");

    match migrations.run(pool).await {
        Ok(()) => {
            info!("All master database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Master migration failed: {}", e);
            Err(e)
        }
    }
}

/// Gets the current migration status of the master database
///
/// # Errors
///
/// Returns an error if the migrations table cannot be queried
pub async fn get_migration_status(pool: &MySqlPool) -> Result<MigrationStatus, sqlx::Error> {
    debug!("Checking migration status");

    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM information_schema.TABLES
         WHERE TABLE_SCHEMA = DATABASE()
         AND TABLE_NAME = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    if table_exists == 0 {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            is_up_to_date: false,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT
            COUNT(*) AS count,
            MAX(version) AS latest_version
         FROM _sqlx_migrations
         WHERE success = TRUE",
    )
    .fetch_one(pool)
    .await?;

    let embedded = sqlx::migrate!("./migrations").iter().count();

    debug!(
        applied_migrations = count,
        embedded_migrations = embedded,
        latest_version = ?latest_version,
        "Migration status retrieved"
    );

    Ok(MigrationStatus {
        applied_migrations: count as usize,
        latest_version,
        is_up_to_date: count as usize >= embedded,
    })
}

/// Creates the master database if it doesn't exist
///
/// Uses a server-level connection, so it works before the master database
/// itself exists.
///
/// # Errors
///
/// Returns an error if the server is unreachable or the user lacks the
/// `CREATE` privilege.
pub async fn ensure_master_database(config: &DatabaseConfig) -> Result<(), sqlx::Error> {
    let name = quote_identifier(&config.master_database).map_err(|reason| {
        sqlx::Error::Configuration(format!("invalid master database name: {}", reason).into())
    })?;

    let server = config.build_pool(ConnectionTarget::Server);

    let statement = format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
        name, config.charset, config.collation
    );

    let result = sqlx::query(&statement).execute(&server).await;
    server.close().await;
    result?;

    info!(database = %config.master_database, "Master database ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_status_clone() {
        let status = MigrationStatus {
            applied_migrations: 3,
            latest_version: Some(20250101000003),
            is_up_to_date: true,
        };

        let cloned = status.clone();
        assert_eq!(status.applied_migrations, cloned.applied_migrations);
        assert_eq!(status.latest_version, cloned.latest_version);
        assert_eq!(status.is_up_to_date, cloned.is_up_to_date);
    }

    #[test]
    fn test_embedded_migrations_are_ordered() {
        let migrator = sqlx::migrate!("./migrations");
        let versions: Vec<i64> = migrator.iter().map(|m| m.version).collect();

        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
