/// Provisioning reconciler
///
/// Tenants whose provisioning stopped after the registry insert stay in the
/// registry below `schema_ready`. The reconciler sweeps them on an interval
/// and resumes each one through the lifecycle manager.
///
/// # Architecture
///
/// ```text
/// ProvisioningReconciler
///   ├─> TenantManager::list_incomplete: tenants below schema_ready
///   └─> TenantManager::resume_provisioning: per tenant, failures logged
/// ```
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taxbook_shared::tenancy::{MemoryDatabaseProvider, MemoryRegistry, TenantManager};
/// use taxbook_worker::config::ReconcilerConfig;
/// use taxbook_worker::reconciler::ProvisioningReconciler;
///
/// # async fn example() -> anyhow::Result<()> {
/// let manager = Arc::new(TenantManager::new(
///     Arc::new(MemoryRegistry::new()),
///     Arc::new(MemoryDatabaseProvider::new()),
/// ));
/// let reconciler = ProvisioningReconciler::new(manager, ReconcilerConfig::default());
///
/// let shutdown = reconciler.shutdown_token();
/// tokio::spawn(async move { reconciler.run().await });
/// shutdown.cancel();
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use taxbook_shared::tenancy::{DatabaseProvider, TenantManager, TenantRegistry};
use taxbook_shared::TenantResult;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tenants moved to `schema_ready`
    pub resumed: usize,

    /// Tenants whose schema is still missing steps
    pub still_incomplete: usize,

    /// Tenants whose resume failed
    pub failed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.resumed + self.still_incomplete + self.failed
    }
}

/// Resumes interrupted tenant provisioning
pub struct ProvisioningReconciler<R: TenantRegistry, P: DatabaseProvider> {
    manager: Arc<TenantManager<R, P>>,
    config: ReconcilerConfig,
    shutdown_token: CancellationToken,
}

impl<R: TenantRegistry, P: DatabaseProvider> ProvisioningReconciler<R, P> {
    pub fn new(manager: Arc<TenantManager<R, P>>, config: ReconcilerConfig) -> Self {
        ProvisioningReconciler {
            manager,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Gets shutdown token
    ///
    /// Cancelling it stops [`run`](Self::run) after the current sweep.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Sweeps until the shutdown token is cancelled
    ///
    /// A failed sweep (registry unreachable) is logged and retried on the
    /// next tick.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.config.interval().as_secs(), "Provisioning reconciler starting");

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            match self.sweep().await {
                Ok(report) if report.total() > 0 => {
                    tracing::info!(
                        resumed = report.resumed,
                        still_incomplete = report.still_incomplete,
                        failed = report.failed,
                        "Reconcile sweep finished"
                    );
                }
                Ok(_) => tracing::debug!("No incomplete tenants"),
                Err(e) => tracing::error!(error = %e, "Failed to list incomplete tenants"),
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        tracing::info!("Provisioning reconciler shut down");
    }

    /// Resumes every incomplete tenant once
    ///
    /// # Errors
    ///
    /// Returns an error only if the incomplete tenants cannot be listed.
    /// Per-tenant failures are counted in the report.
    pub async fn sweep(&self) -> TenantResult<SweepReport> {
        let tenants = self.manager.list_incomplete().await?;
        let mut report = SweepReport::default();

        for tenant in &tenants {
            match self.manager.resume_provisioning(tenant).await {
                Ok(schema) if schema.is_complete() => report.resumed += 1,
                Ok(_) => report.still_incomplete += 1,
                Err(e) => {
                    tracing::error!(
                        tenant_id = %tenant.tenant_id,
                        database = %tenant.database_name,
                        error = %e,
                        "Failed to resume tenant provisioning"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taxbook_shared::models::ProvisioningState;
    use taxbook_shared::tenancy::{MemoryDatabaseProvider, MemoryRegistry};

    type Reconciler = ProvisioningReconciler<MemoryRegistry, MemoryDatabaseProvider>;

    fn setup() -> (Reconciler, Arc<MemoryRegistry>, Arc<MemoryDatabaseProvider>) {
        let registry = Arc::new(MemoryRegistry::new());
        let provider = Arc::new(MemoryDatabaseProvider::new());
        let manager = Arc::new(TenantManager::new(Arc::clone(&registry), Arc::clone(&provider)));
        let reconciler = ProvisioningReconciler::new(manager, ReconcilerConfig { interval_secs: 1 });
        (reconciler, registry, provider)
    }

    #[tokio::test]
    async fn test_sweep_resumes_incomplete_tenants() {
        let (reconciler, registry, provider) = setup();
        registry.seed("tenant_a", "T-A", "tenant_db_a", true, ProvisioningState::RegistryInserted);
        registry.seed("tenant_b", "T-B", "tenant_db_b", true, ProvisioningState::DbCreated);
        registry.seed("tenant_c", "T-C", "tenant_db_c", true, ProvisioningState::SchemaReady);

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report, SweepReport { resumed: 2, still_incomplete: 0, failed: 0 });
        for id in ["tenant_a", "tenant_b", "tenant_c"] {
            assert_eq!(
                registry.get(id).unwrap().provisioning_state,
                ProvisioningState::SchemaReady
            );
        }
        assert_eq!(provider.created_databases().len(), 2);

        // Nothing left for the next sweep
        assert_eq!(reconciler.sweep().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_tenant_does_not_stop_sweep() {
        let (reconciler, registry, provider) = setup();
        registry.seed("tenant_a", "T-A", "tenant_db_a", true, ProvisioningState::RegistryInserted);
        registry.seed("tenant_b", "T-B", "tenant_db_b", true, ProvisioningState::RegistryInserted);
        provider.set_unreachable("tenant_db_a", true);

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report, SweepReport { resumed: 1, still_incomplete: 0, failed: 1 });
        assert_eq!(
            registry.get("tenant_a").unwrap().provisioning_state,
            ProvisioningState::RegistryInserted
        );
        assert_eq!(
            registry.get("tenant_b").unwrap().provisioning_state,
            ProvisioningState::SchemaReady
        );

        // Recovers once the database is back
        provider.set_unreachable("tenant_db_a", false);
        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.resumed, 1);
    }

    #[tokio::test]
    async fn test_incomplete_schema_is_counted_not_promoted() {
        let (reconciler, registry, provider) = setup();
        registry.seed("tenant_a", "T-A", "tenant_db_a", true, ProvisioningState::RegistryInserted);
        provider.incomplete_schema(true);

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report.still_incomplete, 1);
        assert_eq!(
            registry.get("tenant_a").unwrap().provisioning_state,
            ProvisioningState::RegistryInserted
        );
    }

    #[tokio::test]
    async fn test_inactive_tenants_are_skipped() {
        let (reconciler, registry, provider) = setup();
        registry.seed("tenant_a", "T-A", "tenant_db_a", false, ProvisioningState::RegistryInserted);

        assert_eq!(reconciler.sweep().await.unwrap().total(), 0);
        assert!(provider.created_databases().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (reconciler, registry, _provider) = setup();
        registry.seed("tenant_a", "T-A", "tenant_db_a", true, ProvisioningState::RegistryInserted);

        let reconciler = Arc::new(reconciler);
        let shutdown = reconciler.shutdown_token();
        let handle = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.run().await }
        });

        // First sweep runs immediately
        for _ in 0..50 {
            if registry.get("tenant_a").unwrap().provisioning_state.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.get("tenant_a").unwrap().provisioning_state.is_ready());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
    }
}
