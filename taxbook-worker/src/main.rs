//! # Taxbook Worker
//!
//! Runs the provisioning reconciler against the master registry until
//! Ctrl+C.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p taxbook-worker
//! ```

use std::sync::Arc;
use taxbook_shared::db::pool::{close_pool, open_pool, ConnectionTarget};
use taxbook_shared::tenancy::{MySqlDatabaseProvider, MySqlTenantManager, MySqlTenantRegistry};
use taxbook_worker::config::WorkerConfig;
use taxbook_worker::reconciler::ProvisioningReconciler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taxbook_worker=debug,taxbook_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Taxbook Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let master = open_pool(&config.database, ConnectionTarget::Master).await?;
    let registry = MySqlTenantRegistry::new(master.clone());
    let provider = MySqlDatabaseProvider::new(config.database.clone())
        .with_grantee(config.grant_user.clone(), config.grant_host.clone());
    let manager: Arc<MySqlTenantManager> =
        Arc::new(MySqlTenantManager::new(Arc::new(registry), Arc::new(provider)));

    let reconciler = ProvisioningReconciler::new(Arc::clone(&manager), config.reconciler.clone());
    let shutdown = reconciler.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    reconciler.run().await;

    manager.close_all().await;
    close_pool(&master).await;

    Ok(())
}
