/// Tenant database lifecycle manager
///
/// Owns the process-wide cache of tenant connection handles and drives
/// tenant provisioning.
///
/// # Cache
///
/// Handles are keyed by database name. Each key maps to a
/// [`tokio::sync::OnceCell`], so concurrent first resolutions of the same
/// tenant share one in-flight open instead of racing to open several pools.
/// An open that fails leaves its cell empty; the next caller tries again.
///
/// The buyer index repair runs on the first open of each database name and
/// not again for the lifetime of the manager, even after [`close_all`].
///
/// # Provisioning
///
/// ```text
/// Unprovisioned ──► DbCreated ──► RegistryInserted ──► SchemaReady
///  (validated)     (CREATE DATABASE)  (registry row)     (schema applied)
/// ```
///
/// The three steps commit independently. A failure after the database exists
/// is returned as [`TenantError::PartialProvisioning`] carrying the last state
/// reached; the row stays behind with that state so
/// [`resume_provisioning`] can finish the job.
///
/// [`close_all`]: TenantManager::close_all
/// [`resume_provisioning`]: TenantManager::resume_provisioning

use crate::error::{TenantError, TenantResult};
use crate::models::tenant::{CreateTenant, NewTenantRecord, ProvisioningState, Tenant};
use crate::schema::SchemaReport;
use crate::tenancy::naming::{ensure_tenant_database_name, generate_database_name, generate_tenant_id};
use crate::tenancy::provider::{DatabaseProvider, TenantRegistry};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};
use validator::Validate;

type HandleCell<H> = Arc<OnceCell<Arc<H>>>;

/// Result of a successful tenant creation
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTenant {
    pub tenant: Tenant,
    pub database_name: String,
}

/// Registry row plus the live handle for its database
#[derive(Debug)]
pub struct ResolvedTenant<H> {
    pub tenant: Tenant,
    pub handle: Arc<H>,
}

impl<H> Clone for ResolvedTenant<H> {
    fn clone(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            handle: Arc::clone(&self.handle),
        }
    }
}

/// Provisions tenant databases and caches their handles
pub struct TenantManager<R: TenantRegistry, P: DatabaseProvider> {
    registry: Arc<R>,
    provider: Arc<P>,
    handles: RwLock<HashMap<String, HandleCell<P::Handle>>>,
    repaired: Mutex<HashSet<String>>,
}

impl<R: TenantRegistry, P: DatabaseProvider> TenantManager<R, P> {
    pub fn new(registry: Arc<R>, provider: Arc<P>) -> Self {
        Self {
            registry,
            provider,
            handles: RwLock::new(HashMap::new()),
            repaired: Mutex::new(HashSet::new()),
        }
    }

    /// Provisions a new tenant
    ///
    /// Creates the database, inserts the registry row, initializes the
    /// schema and caches the handle.
    ///
    /// # Errors
    ///
    /// - [`TenantError::Validation`] for bad input, including a database name
    ///   that is reserved (nothing is created)
    /// - [`TenantError::DuplicateTenant`] when the tax identifier or database
    ///   name is held by any registry row, active or not; the pre-check runs
    ///   before any database is created
    /// - [`TenantError::Connectivity`] when the server cannot be reached
    /// - [`TenantError::PartialProvisioning`] when a step after database
    ///   creation fails
    pub async fn create(&self, input: CreateTenant) -> TenantResult<CreatedTenant> {
        input
            .validate()
            .map_err(|e| TenantError::Validation(e.to_string()))?;

        let tax_id = input.seller_ntn_cnic.trim().to_string();
        if tax_id.is_empty() {
            return Err(TenantError::Validation(
                "tax identifier must not be blank".to_string(),
            ));
        }

        let database_name = input
            .database_name
            .unwrap_or_else(|| generate_database_name(&tax_id));
        ensure_tenant_database_name(&database_name, self.provider.master_database())?;

        if self.registry.exists_by_tax_id(&tax_id).await? {
            info!(tax_id = %tax_id, "Rejecting tenant with existing tax identifier");
            return Err(TenantError::DuplicateTenant(format!(
                "tax identifier `{}` is already registered",
                tax_id
            )));
        }

        if self.registry.exists_by_database_name(&database_name).await? {
            return Err(TenantError::DuplicateTenant(format!(
                "database `{}` is already registered",
                database_name
            )));
        }

        let tenant_id = generate_tenant_id();

        info!(
            tenant_id = %tenant_id,
            database = %database_name,
            state = %ProvisioningState::Unprovisioned,
            "Provisioning tenant"
        );

        self.provider.create_database(&database_name).await?;

        info!(tenant_id = %tenant_id, database = %database_name, state = %ProvisioningState::DbCreated, "Provisioning step done");

        let record = NewTenantRecord {
            tenant_id: tenant_id.clone(),
            seller_ntn_cnic: tax_id,
            seller_business_name: input.seller_business_name,
            seller_province: input.seller_province,
            seller_address: input.seller_address,
            database_name: database_name.clone(),
            provisioning_state: ProvisioningState::RegistryInserted,
        };

        let mut tenant = match self.registry.insert(&record).await {
            Ok(tenant) => tenant,
            Err(TenantError::DuplicateTenant(reason)) => {
                warn!(
                    database = %database_name,
                    reason = %reason,
                    "Registry insert lost a race; database left without a registry row"
                );
                return Err(TenantError::DuplicateTenant(reason));
            }
            Err(e) => {
                return Err(TenantError::partial(&database_name, ProvisioningState::DbCreated, e));
            }
        };

        info!(tenant_id = %tenant_id, database = %database_name, state = %ProvisioningState::RegistryInserted, "Provisioning step done");

        let handle = self
            .provider
            .connect(&database_name)
            .await
            .map_err(|e| TenantError::partial(&database_name, ProvisioningState::RegistryInserted, e))?;

        let report = match self.provider.initialize_schema(&handle).await {
            Ok(report) => report,
            Err(e) => {
                self.provider.close(&handle).await;
                return Err(TenantError::partial(&database_name, ProvisioningState::RegistryInserted, e));
            }
        };
        self.repaired.lock().await.insert(database_name.clone());

        if report.is_complete() {
            if let Err(e) = self
                .registry
                .set_provisioning_state(&tenant_id, ProvisioningState::SchemaReady)
                .await
            {
                self.provider.close(&handle).await;
                return Err(TenantError::partial(&database_name, ProvisioningState::RegistryInserted, e));
            }
            tenant.provisioning_state = ProvisioningState::SchemaReady;
            info!(tenant_id = %tenant_id, database = %database_name, state = %ProvisioningState::SchemaReady, "Tenant provisioned");
        } else {
            warn!(
                tenant_id = %tenant_id,
                database = %database_name,
                incomplete = ?report.incomplete,
                "Tenant schema incomplete, left as registry_inserted for the reconciler"
            );
        }

        let handle = Arc::new(handle);
        let cell = self.cell_for(&database_name).await;
        if cell.set(Arc::clone(&handle)).is_err() {
            // A resolve raced us to the cache; keep its handle
            self.provider.close(&handle).await;
        }

        Ok(CreatedTenant {
            tenant,
            database_name,
        })
    }

    /// Resolves an active tenant by its string id
    ///
    /// # Errors
    ///
    /// [`TenantError::NotFound`] if no active tenant has this id;
    /// [`TenantError::Connectivity`] if its database cannot be opened.
    pub async fn resolve(&self, tenant_id: &str) -> TenantResult<ResolvedTenant<P::Handle>> {
        let tenant = self
            .registry
            .find_active_by_tenant_id(tenant_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

        self.attach(tenant).await
    }

    /// Resolves an active tenant by its physical database name
    pub async fn resolve_by_database_name(
        &self,
        database_name: &str,
    ) -> TenantResult<ResolvedTenant<P::Handle>> {
        let tenant = self
            .registry
            .find_active_by_database_name(database_name)
            .await?
            .ok_or_else(|| TenantError::NotFound(database_name.to_string()))?;

        self.attach(tenant).await
    }

    /// Every active tenant
    pub async fn list_active(&self) -> TenantResult<Vec<Tenant>> {
        let tenants = self.registry.list_active().await?;
        Ok(tenants.into_iter().filter(|t| t.is_active).collect())
    }

    /// Active tenants stuck before `schema_ready`
    pub async fn list_incomplete(&self) -> TenantResult<Vec<Tenant>> {
        self.registry.list_incomplete().await
    }

    /// Deactivates an active tenant and drops its cached handle
    ///
    /// The database and its registry row are kept. The tenant no longer
    /// resolves, and its tax identifier and database name stay taken.
    pub async fn deactivate(&self, tenant_id: &str) -> TenantResult<Tenant> {
        let mut tenant = self
            .registry
            .find_active_by_tenant_id(tenant_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

        self.registry.set_active(tenant_id, false).await?;
        tenant.is_active = false;

        let evicted = self.handles.write().await.remove(&tenant.database_name);
        if let Some(handle) = evicted.as_ref().and_then(|cell| cell.get()) {
            self.provider.close(handle).await;
        }

        info!(tenant_id = %tenant_id, database = %tenant.database_name, "Tenant deactivated");
        Ok(tenant)
    }

    /// Closes every cached handle and empties the cache
    ///
    /// Returns how many handles were closed. An open still in flight when
    /// this runs completes for its caller but is not cached.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<(String, HandleCell<P::Handle>)> =
            self.handles.write().await.drain().collect();

        let mut closed = 0;
        for (database_name, cell) in drained {
            if let Some(handle) = cell.get() {
                self.provider.close(handle).await;
                debug!(database = %database_name, "Tenant handle closed");
                closed += 1;
            }
        }

        info!(closed, "Closed all tenant connections");
        closed
    }

    /// Replays the provisioning steps of a tenant that never reached `schema_ready`
    ///
    /// Every step is idempotent. The handle opened here is closed again, so
    /// the cache is left untouched.
    pub async fn resume_provisioning(&self, tenant: &Tenant) -> TenantResult<SchemaReport> {
        let database_name = tenant.database_name.as_str();
        let from = tenant.provisioning_state;

        info!(tenant_id = %tenant.tenant_id, database = %database_name, state = %from, "Resuming tenant provisioning");

        self.provider
            .create_database(database_name)
            .await
            .map_err(|e| TenantError::partial(database_name, from, e))?;

        let handle = self
            .provider
            .connect(database_name)
            .await
            .map_err(|e| TenantError::partial(database_name, from, e))?;

        let result = self.provider.initialize_schema(&handle).await;
        self.provider.close(&handle).await;

        let report = result.map_err(|e| TenantError::partial(database_name, from, e))?;
        self.repaired.lock().await.insert(database_name.to_string());

        if report.is_complete() {
            self.registry
                .set_provisioning_state(&tenant.tenant_id, ProvisioningState::SchemaReady)
                .await
                .map_err(|e| TenantError::partial(database_name, from, e))?;
            info!(tenant_id = %tenant.tenant_id, database = %database_name, "Tenant provisioning resumed to schema_ready");
        } else {
            warn!(
                tenant_id = %tenant.tenant_id,
                database = %database_name,
                incomplete = ?report.incomplete,
                "Tenant schema still incomplete"
            );
        }

        Ok(report)
    }

    /// Number of open cached handles
    pub async fn cached_count(&self) -> usize {
        self.handles
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Whether a handle for this database is cached
    pub async fn is_cached(&self, database_name: &str) -> bool {
        self.handles
            .read()
            .await
            .get(database_name)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    async fn attach(&self, tenant: Tenant) -> TenantResult<ResolvedTenant<P::Handle>> {
        if !tenant.provisioning_state.is_ready() {
            warn!(
                tenant_id = %tenant.tenant_id,
                state = %tenant.provisioning_state,
                "Resolving tenant whose provisioning is incomplete"
            );
        }

        let handle = self.handle_for(&tenant.database_name).await?;
        Ok(ResolvedTenant { tenant, handle })
    }

    async fn cell_for(&self, database_name: &str) -> HandleCell<P::Handle> {
        let existing = self.handles.read().await.get(database_name).cloned();

        match existing {
            Some(cell) => cell,
            None => {
                let mut handles = self.handles.write().await;
                Arc::clone(handles.entry(database_name.to_string()).or_default())
            }
        }
    }

    async fn handle_for(&self, database_name: &str) -> TenantResult<Arc<P::Handle>> {
        let cell = self.cell_for(database_name).await;

        let handle = cell
            .get_or_try_init(|| self.open_handle(database_name))
            .await?;

        Ok(Arc::clone(handle))
    }

    async fn open_handle(&self, database_name: &str) -> TenantResult<Arc<P::Handle>> {
        debug!(database = %database_name, "Opening tenant handle");

        let handle = self.provider.connect(database_name).await?;

        let first_open = self.repaired.lock().await.insert(database_name.to_string());
        if first_open {
            for warning in self.provider.repair_indexes(&handle).await {
                warn!(
                    database = %database_name,
                    step = %warning.step,
                    message = %warning.message,
                    "Buyer index repair warning"
                );
            }
        }

        info!(database = %database_name, "Tenant handle cached");
        Ok(Arc::new(handle))
    }
}
