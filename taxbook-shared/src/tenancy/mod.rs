/// Tenant database lifecycle
///
/// # Modules
///
/// - `naming`: tenant id / database name generation and identifier quoting
/// - `provider`: the registry and database server seams
/// - `mysql`: MySQL implementations of both seams
/// - `manager`: provisioning and the tenant handle cache
/// - `memory`: in-memory seams for tests and local runs
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taxbook_shared::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
/// use taxbook_shared::tenancy::{MySqlDatabaseProvider, MySqlTenantManager, MySqlTenantRegistry};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DatabaseConfig::from_env();
/// let master = open_pool(&config, ConnectionTarget::Master).await?;
///
/// let manager = MySqlTenantManager::new(
///     Arc::new(MySqlTenantRegistry::new(master)),
///     Arc::new(MySqlDatabaseProvider::new(config)),
/// );
///
/// let resolved = manager.resolve("tenant_1735689600000_k3j9x2m1q").await?;
/// let buyers = resolved.handle.models.buyers.list(50, 0).await?;
/// println!("{} buyers", buyers.len());
///
/// manager.close_all().await;
/// # Ok(())
/// # }
/// ```

pub mod manager;
pub mod memory;
pub mod mysql;
pub mod naming;
pub mod provider;

pub use manager::{CreatedTenant, ResolvedTenant, TenantManager};
pub use memory::{MemoryDatabaseProvider, MemoryHandle, MemoryRegistry};
pub use mysql::{MySqlDatabaseProvider, MySqlTenantRegistry, TenantDatabase};
pub use provider::{DatabaseProvider, TenantRegistry};

/// Manager wired to MySQL
pub type MySqlTenantManager = TenantManager<MySqlTenantRegistry, MySqlDatabaseProvider>;

/// Resolved tenant with a MySQL handle
pub type ResolvedMySqlTenant = ResolvedTenant<TenantDatabase>;
