//! # Taxbook API Server
//!
//! Serves tenant provisioning and tenant-scoped invoicing endpoints.
//!
//! ## Startup
//!
//! 1. Create the master database if it does not exist
//! 2. Apply master migrations (the `tenants` registry)
//! 3. Serve until Ctrl+C, then close every cached tenant pool
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p taxbook-api
//! ```

use taxbook_api::{
    app::{build_router, AppState},
    config::Config,
};
use taxbook_shared::db::{
    migrations::{ensure_master_database, run_migrations},
    pool::{close_pool, open_pool, ConnectionTarget},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taxbook_api=debug,taxbook_shared=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Taxbook API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    ensure_master_database(&config.database).await?;
    let master = open_pool(&config.database, ConnectionTarget::Master).await?;
    run_migrations(&master).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(master.clone(), config);
    let tenants = state.tenants.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = tenants.close_all().await;
    tracing::info!(closed, "Tenant connection pools closed");

    close_pool(&master).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
