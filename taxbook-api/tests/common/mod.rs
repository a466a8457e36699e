/// Common test utilities for integration tests
///
/// This module provides shared infrastructure for integration tests:
/// - An app wired to a database server that never answers
/// - An app wired to the MySQL server named by `DB_*` variables
/// - Request and body helpers

use axum::body::Body;
use axum::http::{Request, Response};
use taxbook_api::app::{build_router, AppState};
use taxbook_api::config::{ApiConfig, Config, ProvisioningConfig};
use taxbook_shared::db::pool::{ConnectionTarget, DatabaseConfig};
use tower::Service as _;

/// Test context containing the router and the state behind it
pub struct TestContext {
    pub app: axum::Router,
    pub state: AppState,
}

impl TestContext {
    /// App whose database server refuses every connection
    ///
    /// Pools are lazy, so the app builds without a server; any handler that
    /// touches a database fails fast with a connectivity error.
    pub fn offline() -> Self {
        let database = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "taxbook".to_string(),
            acquire_timeout_seconds: 1,
            ..DatabaseConfig::default()
        };

        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: Vec::new(),
            },
            provisioning: ProvisioningConfig {
                grant_user: database.username.clone(),
                grant_host: "%".to_string(),
            },
            database,
        };

        Self::with_config(config)
    }

    /// App connected to the configured MySQL server with master migrations applied
    pub async fn online() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        taxbook_shared::db::migrations::ensure_master_database(&config.database).await?;
        let ctx = Self::with_config(config);
        taxbook_shared::db::migrations::run_migrations(&ctx.state.db).await?;

        Ok(ctx)
    }

    fn with_config(config: Config) -> Self {
        let master = config.database.build_pool(ConnectionTarget::Master);
        let state = AppState::new(master, config);
        let app = build_router(state.clone());

        TestContext { app, state }
    }

    /// Sends a request through the router
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().call(request).await.unwrap()
    }

    /// Closes every pool the app opened
    pub async fn cleanup(&self) {
        self.state.tenants.close_all().await;
        self.state.db.close().await;
    }
}

/// Builds a JSON request, optionally scoped to a tenant
pub fn json_request(
    method: &str,
    uri: &str,
    tenant_id: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(tenant_id) = tenant_id {
        builder = builder.header(taxbook_api::app::TENANT_HEADER, tenant_id);
    }

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Reads a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
