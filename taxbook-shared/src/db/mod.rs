/// Database layer for Taxbook
///
/// # Modules
///
/// - `pool`: MySQL connection factory for the server, the master database
///   and tenant databases
/// - `migrations`: master database bootstrap and migration runner
///
/// Tenant schemas are not managed here; see [`crate::schema`].
///
/// # Example
///
/// ```no_run
/// use taxbook_shared::db::migrations::{ensure_master_database, run_migrations};
/// use taxbook_shared::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env();
///
///     ensure_master_database(&config).await?;
///     let pool = open_pool(&config, ConnectionTarget::Master).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
