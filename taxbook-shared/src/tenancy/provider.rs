/// Storage seams of the lifecycle manager
///
/// The manager talks to two collaborators:
///
/// - a [`TenantRegistry`]: the durable tenant table in the master database
/// - a [`DatabaseProvider`]: the database server, which creates tenant
///   databases and opens connection handles to them
///
/// Production uses the MySQL implementations in [`super::mysql`]. Tests plug
/// in in-memory implementations so the caching and provisioning rules can be
/// exercised without a server.

use crate::error::TenantResult;
use crate::models::tenant::{NewTenantRecord, ProvisioningState, Tenant};
use crate::schema::{SchemaReport, SchemaWarning};
use async_trait::async_trait;

/// Durable tenant registry
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Active tenant with this string id
    async fn find_active_by_tenant_id(&self, tenant_id: &str) -> TenantResult<Option<Tenant>>;

    /// Active tenant backed by this database
    async fn find_active_by_database_name(&self, database_name: &str) -> TenantResult<Option<Tenant>>;

    /// Whether any row, active or not, holds this seller tax identifier
    ///
    /// Inactive rows still own their unique keys, so creation pre-checks
    /// must see them.
    async fn exists_by_tax_id(&self, tax_id: &str) -> TenantResult<bool>;

    /// Whether any row, active or not, is backed by this database
    async fn exists_by_database_name(&self, database_name: &str) -> TenantResult<bool>;

    /// Inserts a registry row
    ///
    /// A collision on tenant id, tax identifier or database name must come
    /// back as [`TenantError::DuplicateTenant`](crate::error::TenantError::DuplicateTenant).
    async fn insert(&self, record: &NewTenantRecord) -> TenantResult<Tenant>;

    /// Persists a provisioning transition
    async fn set_provisioning_state(&self, tenant_id: &str, state: ProvisioningState) -> TenantResult<()>;

    /// Activates or deactivates a tenant
    ///
    /// [`TenantError::NotFound`](crate::error::TenantError::NotFound) when no
    /// row has this id.
    async fn set_active(&self, tenant_id: &str, active: bool) -> TenantResult<()>;

    /// Every active tenant
    async fn list_active(&self) -> TenantResult<Vec<Tenant>>;

    /// Active tenants that never reached `schema_ready`
    async fn list_incomplete(&self) -> TenantResult<Vec<Tenant>>;
}

/// Database server operations
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// Live connection plus entity bindings for one tenant database
    type Handle: Send + Sync + 'static;

    /// Name of the master database, which no tenant may claim
    fn master_database(&self) -> &str;

    /// Creates the database if missing and grants the application user access
    async fn create_database(&self, database_name: &str) -> TenantResult<()>;

    /// Opens and authenticates a handle to an existing database
    ///
    /// Must fail fast with
    /// [`TenantError::Connectivity`](crate::error::TenantError::Connectivity)
    /// when the database is unreachable.
    async fn connect(&self, database_name: &str) -> TenantResult<Self::Handle>;

    /// Runs the full schema initializer, index repair included
    async fn initialize_schema(&self, handle: &Self::Handle) -> TenantResult<SchemaReport>;

    /// Runs only the buyer tax-id index repair
    async fn repair_indexes(&self, handle: &Self::Handle) -> Vec<SchemaWarning>;

    /// Closes every connection held by the handle
    async fn close(&self, handle: &Self::Handle);
}
