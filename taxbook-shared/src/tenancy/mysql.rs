/// MySQL implementations of the lifecycle seams
///
/// - [`MySqlTenantRegistry`]: the `tenants` table of the master database
/// - [`MySqlDatabaseProvider`]: the MySQL server; creates tenant databases
///   over a connection with no database selected and opens one pool per
///   tenant database
/// - [`TenantDatabase`]: the cached handle, a tenant pool plus its entity
///   bindings

use crate::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
use crate::error::{is_unique_violation, TenantError, TenantResult};
use crate::models::tenant::{NewTenantRecord, ProvisioningState, Tenant};
use crate::models::TenantModels;
use crate::schema::{initialize_tenant_schema, repair_buyer_tax_index, SchemaReport, SchemaWarning};
use crate::tenancy::naming::{
    ensure_tenant_database_name, quote_account, quote_identifier, validate_database_name,
};
use crate::tenancy::provider::{DatabaseProvider, TenantRegistry};
use async_trait::async_trait;
use sqlx::MySqlPool;
use tracing::{info, warn};

/// Open connection to one tenant database
#[derive(Debug, Clone)]
pub struct TenantDatabase {
    pub database_name: String,
    pub pool: MySqlPool,
    pub models: TenantModels,
}

/// Registry backed by the master database
#[derive(Debug, Clone)]
pub struct MySqlTenantRegistry {
    pool: MySqlPool,
}

impl MySqlTenantRegistry {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Registry failures on an unreachable master are connectivity errors
fn registry_error(err: sqlx::Error) -> TenantError {
    TenantError::from_connect("master", err)
}

#[async_trait]
impl TenantRegistry for MySqlTenantRegistry {
    async fn find_active_by_tenant_id(&self, tenant_id: &str) -> TenantResult<Option<Tenant>> {
        Tenant::find_active_by_tenant_id(&self.pool, tenant_id)
            .await
            .map_err(registry_error)
    }

    async fn find_active_by_database_name(&self, database_name: &str) -> TenantResult<Option<Tenant>> {
        Tenant::find_active_by_database_name(&self.pool, database_name)
            .await
            .map_err(registry_error)
    }

    async fn exists_by_tax_id(&self, tax_id: &str) -> TenantResult<bool> {
        Tenant::tax_id_exists(&self.pool, tax_id)
            .await
            .map_err(registry_error)
    }

    async fn exists_by_database_name(&self, database_name: &str) -> TenantResult<bool> {
        Tenant::database_name_exists(&self.pool, database_name)
            .await
            .map_err(registry_error)
    }

    async fn insert(&self, record: &NewTenantRecord) -> TenantResult<Tenant> {
        Tenant::insert(&self.pool, record).await.map_err(|e| {
            if is_unique_violation(&e) {
                TenantError::DuplicateTenant(format!(
                    "tax identifier `{}` or database `{}` is already registered",
                    record.seller_ntn_cnic, record.database_name
                ))
            } else {
                registry_error(e)
            }
        })
    }

    async fn set_provisioning_state(&self, tenant_id: &str, state: ProvisioningState) -> TenantResult<()> {
        let updated = Tenant::set_provisioning_state(&self.pool, tenant_id, state)
            .await
            .map_err(registry_error)?;

        if updated {
            Ok(())
        } else {
            Err(TenantError::NotFound(tenant_id.to_string()))
        }
    }

    async fn set_active(&self, tenant_id: &str, active: bool) -> TenantResult<()> {
        let updated = Tenant::set_active(&self.pool, tenant_id, active)
            .await
            .map_err(registry_error)?;

        if updated {
            Ok(())
        } else {
            Err(TenantError::NotFound(tenant_id.to_string()))
        }
    }

    async fn list_active(&self) -> TenantResult<Vec<Tenant>> {
        Tenant::list_active(&self.pool).await.map_err(registry_error)
    }

    async fn list_incomplete(&self) -> TenantResult<Vec<Tenant>> {
        Tenant::list_incomplete(&self.pool).await.map_err(registry_error)
    }
}

/// Database server used for tenant databases
#[derive(Debug, Clone)]
pub struct MySqlDatabaseProvider {
    config: DatabaseConfig,
    grant_user: String,
    grant_host: String,
}

impl MySqlDatabaseProvider {
    /// Provider granting tenant databases to the configured user at `%`
    pub fn new(config: DatabaseConfig) -> Self {
        let grant_user = config.username.clone();
        Self {
            config,
            grant_user,
            grant_host: "%".to_string(),
        }
    }

    /// Grants tenant databases to another account
    pub fn with_grantee(mut self, user: impl Into<String>, host: impl Into<String>) -> Self {
        self.grant_user = user.into();
        self.grant_host = host.into();
        self
    }
}

#[async_trait]
impl DatabaseProvider for MySqlDatabaseProvider {
    type Handle = TenantDatabase;

    fn master_database(&self) -> &str {
        &self.config.master_database
    }

    async fn create_database(&self, database_name: &str) -> TenantResult<()> {
        ensure_tenant_database_name(database_name, &self.config.master_database)?;
        let quoted = quote_identifier(database_name)?;

        let server = open_pool(&self.config, ConnectionTarget::Server)
            .await
            .map_err(|e| TenantError::from_connect("", e))?;

        let create = format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
            quoted, self.config.charset, self.config.collation
        );

        if let Err(e) = sqlx::query(&create).execute(&server).await {
            server.close().await;
            return Err(TenantError::from_connect(database_name, e));
        }

        info!(database = %database_name, "Tenant database created");

        // A missing GRANT privilege leaves the database usable by its creator
        let grant = format!(
            "GRANT ALL PRIVILEGES ON {}.* TO {}@{}",
            quoted,
            quote_account(&self.grant_user),
            quote_account(&self.grant_host)
        );

        match sqlx::query(&grant).execute(&server).await {
            Ok(_) => {
                if let Err(e) = sqlx::query("FLUSH PRIVILEGES").execute(&server).await {
                    warn!(database = %database_name, error = %e, "FLUSH PRIVILEGES failed");
                }
            }
            Err(e) => {
                warn!(
                    database = %database_name,
                    grantee = %self.grant_user,
                    error = %e,
                    "Could not grant privileges on tenant database"
                );
            }
        }

        server.close().await;
        Ok(())
    }

    async fn connect(&self, database_name: &str) -> TenantResult<TenantDatabase> {
        validate_database_name(database_name)?;

        let pool = open_pool(&self.config, ConnectionTarget::Tenant(database_name))
            .await
            .map_err(|e| TenantError::from_connect(database_name, e))?;

        let models = TenantModels::bind(&pool);

        Ok(TenantDatabase {
            database_name: database_name.to_string(),
            pool,
            models,
        })
    }

    async fn initialize_schema(&self, handle: &TenantDatabase) -> TenantResult<SchemaReport> {
        let report = initialize_tenant_schema(&handle.pool)
            .await
            .map_err(|e| TenantError::from_connect(&handle.database_name, e))?;

        info!(
            database = %handle.database_name,
            applied = report.applied.len(),
            warnings = report.warnings.len(),
            complete = report.is_complete(),
            "Tenant schema initialized"
        );

        Ok(report)
    }

    async fn repair_indexes(&self, handle: &TenantDatabase) -> Vec<SchemaWarning> {
        repair_buyer_tax_index(&handle.pool).await
    }

    async fn close(&self, handle: &TenantDatabase) {
        info!(database = %handle.database_name, "Closing tenant connection pool");
        handle.pool.close().await;
    }
}
