/// In-memory registry and database provider
///
/// Stand-ins for MySQL that record what the lifecycle manager asked them to
/// do. Useful for:
/// - testing the manager, the API and the reconciler without a server
/// - simulating unreachable databases and failing schema runs
///
/// Handles are [`MemoryHandle`] values with a unique, increasing id, so a test
/// can tell a cached handle from a freshly opened one.

use crate::error::{TenantError, TenantResult};
use crate::models::tenant::{NewTenantRecord, ProvisioningState, Tenant};
use crate::schema::{latest_version, SchemaReport, SchemaWarning};
use crate::tenancy::provider::{DatabaseProvider, TenantRegistry};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn poisoned() -> TenantError {
    TenantError::Validation("in-memory store lock poisoned".to_string())
}

/// Registry held in a vector
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    rows: Mutex<Vec<Tenant>>,
    next_id: AtomicU64,
    skip_tax_id_precheck: AtomicBool,
    fail_state_updates: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row directly, bypassing provisioning
    pub fn seed(
        &self,
        tenant_id: &str,
        tax_id: &str,
        database_name: &str,
        is_active: bool,
        state: ProvisioningState,
    ) -> Tenant {
        let now = Utc::now();
        let tenant = Tenant {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
            tenant_id: tenant_id.to_string(),
            seller_ntn_cnic: tax_id.to_string(),
            seller_business_name: format!("Seller {}", tax_id),
            seller_province: None,
            seller_address: None,
            database_name: database_name.to_string(),
            is_active,
            provisioning_state: state,
            created_at: now,
            updated_at: now,
        };

        if let Ok(mut rows) = self.rows.lock() {
            rows.push(tenant.clone());
        }
        tenant
    }

    /// Makes `exists_by_tax_id` miss, as if a concurrent create had not
    /// committed yet
    pub fn skip_tax_id_precheck(&self, skip: bool) {
        self.skip_tax_id_precheck.store(skip, Ordering::SeqCst);
    }

    /// Makes `set_provisioning_state` fail
    pub fn fail_state_updates(&self, fail: bool) {
        self.fail_state_updates.store(fail, Ordering::SeqCst);
    }

    /// Current row for a tenant id, active or not
    pub fn get(&self, tenant_id: &str) -> Option<Tenant> {
        self.rows
            .lock()
            .ok()?
            .iter()
            .find(|t| t.tenant_id == tenant_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_active(&self, matches: impl Fn(&Tenant) -> bool) -> TenantResult<Option<Tenant>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.iter().find(|t| t.is_active && matches(t)).cloned())
    }
}

#[async_trait]
impl TenantRegistry for MemoryRegistry {
    async fn find_active_by_tenant_id(&self, tenant_id: &str) -> TenantResult<Option<Tenant>> {
        self.find_active(|t| t.tenant_id == tenant_id)
    }

    async fn find_active_by_database_name(&self, database_name: &str) -> TenantResult<Option<Tenant>> {
        self.find_active(|t| t.database_name == database_name)
    }

    async fn exists_by_tax_id(&self, tax_id: &str) -> TenantResult<bool> {
        if self.skip_tax_id_precheck.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.iter().any(|t| t.seller_ntn_cnic == tax_id))
    }

    async fn exists_by_database_name(&self, database_name: &str) -> TenantResult<bool> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.iter().any(|t| t.database_name == database_name))
    }

    async fn insert(&self, record: &NewTenantRecord) -> TenantResult<Tenant> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;

        // Same unique keys as the tenants table
        let clash = rows.iter().any(|t| {
            t.tenant_id == record.tenant_id
                || t.seller_ntn_cnic == record.seller_ntn_cnic
                || t.database_name == record.database_name
        });
        if clash {
            return Err(TenantError::DuplicateTenant(format!(
                "tax identifier `{}` or database `{}` is already registered",
                record.seller_ntn_cnic, record.database_name
            )));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
            tenant_id: record.tenant_id.clone(),
            seller_ntn_cnic: record.seller_ntn_cnic.clone(),
            seller_business_name: record.seller_business_name.clone(),
            seller_province: record.seller_province.clone(),
            seller_address: record.seller_address.clone(),
            database_name: record.database_name.clone(),
            is_active: true,
            provisioning_state: record.provisioning_state,
            created_at: now,
            updated_at: now,
        };
        rows.push(tenant.clone());

        Ok(tenant)
    }

    async fn set_provisioning_state(&self, tenant_id: &str, state: ProvisioningState) -> TenantResult<()> {
        if self.fail_state_updates.load(Ordering::SeqCst) {
            return Err(TenantError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = rows
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id)
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

        row.provisioning_state = state;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, tenant_id: &str, active: bool) -> TenantResult<()> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = rows
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id)
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

        row.is_active = active;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn list_active(&self) -> TenantResult<Vec<Tenant>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.iter().filter(|t| t.is_active).cloned().collect())
    }

    async fn list_incomplete(&self) -> TenantResult<Vec<Tenant>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|t| t.is_active && !t.provisioning_state.is_ready())
            .cloned()
            .collect())
    }
}

/// Handle returned by [`MemoryDatabaseProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHandle {
    pub id: u64,
    pub database_name: String,
}

/// Database server that only keeps counters
#[derive(Debug)]
pub struct MemoryDatabaseProvider {
    master_database: String,
    databases: Mutex<Vec<String>>,
    unreachable: Mutex<HashSet<String>>,
    closed: Mutex<Vec<u64>>,
    next_handle: AtomicU64,
    connects: AtomicUsize,
    repairs: AtomicUsize,
    schema_runs: AtomicUsize,
    connect_delay_ms: AtomicU64,
    fail_schema: AtomicBool,
    incomplete_schema: AtomicBool,
}

impl Default for MemoryDatabaseProvider {
    fn default() -> Self {
        Self {
            master_database: "fbr_master".to_string(),
            databases: Mutex::default(),
            unreachable: Mutex::default(),
            closed: Mutex::default(),
            next_handle: AtomicU64::default(),
            connects: AtomicUsize::default(),
            repairs: AtomicUsize::default(),
            schema_runs: AtomicUsize::default(),
            connect_delay_ms: AtomicU64::default(),
            fail_schema: AtomicBool::default(),
            incomplete_schema: AtomicBool::default(),
        }
    }
}

impl MemoryDatabaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the master database guarded against tenant use
    pub fn with_master_database(mut self, name: impl Into<String>) -> Self {
        self.master_database = name.into();
        self
    }

    /// Delays every `connect`, widening the window for concurrent resolves
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn set_unreachable(&self, database_name: &str, unreachable: bool) {
        if let Ok(mut set) = self.unreachable.lock() {
            if unreachable {
                set.insert(database_name.to_string());
            } else {
                set.remove(database_name);
            }
        }
    }

    /// Makes `initialize_schema` return an error
    pub fn fail_schema(&self, fail: bool) {
        self.fail_schema.store(fail, Ordering::SeqCst);
    }

    /// Makes `initialize_schema` report an unapplied migration
    pub fn incomplete_schema(&self, incomplete: bool) {
        self.incomplete_schema.store(incomplete, Ordering::SeqCst);
    }

    /// Databases created, in order (repeats included)
    pub fn created_databases(&self) -> Vec<String> {
        self.databases.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Ids of closed handles
    pub fn closed_handles(&self) -> Vec<u64> {
        self.closed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn repair_count(&self) -> usize {
        self.repairs.load(Ordering::SeqCst)
    }

    pub fn schema_run_count(&self) -> usize {
        self.schema_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseProvider for MemoryDatabaseProvider {
    type Handle = MemoryHandle;

    fn master_database(&self) -> &str {
        &self.master_database
    }

    async fn create_database(&self, database_name: &str) -> TenantResult<()> {
        self.databases
            .lock()
            .map_err(|_| poisoned())?
            .push(database_name.to_string());
        Ok(())
    }

    async fn connect(&self, database_name: &str) -> TenantResult<MemoryHandle> {
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let unreachable = self
            .unreachable
            .lock()
            .map_err(|_| poisoned())?
            .contains(database_name);
        if unreachable {
            return Err(TenantError::Connectivity {
                database: database_name.to_string(),
                source: sqlx::Error::PoolTimedOut,
            });
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryHandle {
            id: self.next_handle.fetch_add(1, Ordering::SeqCst) + 1,
            database_name: database_name.to_string(),
        })
    }

    async fn initialize_schema(&self, _handle: &MemoryHandle) -> TenantResult<SchemaReport> {
        self.schema_runs.fetch_add(1, Ordering::SeqCst);

        if self.fail_schema.load(Ordering::SeqCst) {
            return Err(TenantError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut report = SchemaReport {
            applied: (1..=latest_version()).collect(),
            ..Default::default()
        };

        if self.incomplete_schema.load(Ordering::SeqCst) {
            let last = latest_version();
            report.applied.retain(|v| *v != last);
            report.incomplete.push(last);
            report.warnings.push(SchemaWarning {
                step: format!("migration {}", last),
                message: "simulated failure".to_string(),
            });
        }

        Ok(report)
    }

    async fn repair_indexes(&self, _handle: &MemoryHandle) -> Vec<SchemaWarning> {
        self.repairs.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }

    async fn close(&self, handle: &MemoryHandle) {
        if let Ok(mut closed) = self.closed.lock() {
            closed.push(handle.id);
        }
    }
}
