/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use taxbook_api::{app::AppState, config::Config};
/// use taxbook_shared::db::pool::{open_pool, ConnectionTarget};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let master = open_pool(&config.database, ConnectionTarget::Master).await?;
/// let state = AppState::new(master, config);
/// let app = taxbook_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use sqlx::MySqlPool;
use std::sync::Arc;
use taxbook_shared::tenancy::{MySqlDatabaseProvider, MySqlTenantManager, MySqlTenantRegistry};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Header carrying the caller's tenant id
///
/// Stands in for the tenant claim of an authenticated session.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Master database connection pool
    pub db: MySqlPool,

    /// Tenant lifecycle manager (owns every tenant pool)
    pub tenants: Arc<MySqlTenantManager>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state with a MySQL-backed tenant manager
    pub fn new(db: MySqlPool, config: Config) -> Self {
        let registry = MySqlTenantRegistry::new(db.clone());
        let provider = MySqlDatabaseProvider::new(config.database.clone()).with_grantee(
            config.provisioning.grant_user.clone(),
            config.provisioning.grant_host.clone(),
        );

        Self {
            db,
            tenants: Arc::new(MySqlTenantManager::new(Arc::new(registry), Arc::new(provider))),
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                                   # Health check (public)
/// └── /v1/
///     ├── /admin/                               # Back-office
///     │   ├── POST /tenants                     # Provision a tenant
///     │   ├── GET  /tenants                     # List active tenants
///     │   ├── GET  /tenants/incomplete          # Tenants stuck mid-provisioning
///     │   ├── POST /tenants/:id/deactivate      # Deactivate a tenant
///     │   └── GET  /databases/:name/invoices    # Invoices by database name
///     ├── /buyers        GET, POST              # X-Tenant-ID scoped
///     ├── /products      GET, POST              # X-Tenant-ID scoped
///     └── /invoices      GET, POST              # X-Tenant-ID scoped
///         ├── GET  /:id
///         ├── POST /:id/post
///         └── /:id/backups  GET, POST
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Compression
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Tenant resolution (tenant-scoped routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let admin_routes = Router::new()
        .route(
            "/tenants",
            post(routes::tenants::create_tenant).get(routes::tenants::list_tenants),
        )
        .route("/tenants/incomplete", get(routes::tenants::list_incomplete_tenants))
        .route(
            "/tenants/:tenant_id/deactivate",
            post(routes::tenants::deactivate_tenant),
        )
        .route(
            "/databases/:database_name/invoices",
            get(routes::tenants::list_database_invoices),
        );

    // Every route below needs a resolved tenant
    let tenant_routes = Router::new()
        .route(
            "/buyers",
            get(routes::buyers::list_buyers).post(routes::buyers::create_buyer),
        )
        .route(
            "/products",
            get(routes::products::list_products).post(routes::products::create_product),
        )
        .route(
            "/invoices",
            get(routes::invoices::list_invoices).post(routes::invoices::create_invoice),
        )
        .route("/invoices/:id", get(routes::invoices::get_invoice))
        .route("/invoices/:id/post", post(routes::invoices::post_invoice))
        .route(
            "/invoices/:id/backups",
            get(routes::invoices::list_backups).post(routes::invoices::create_backup),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            tenant_scope_layer,
        ));

    let v1_routes = Router::new()
        .nest("/admin", admin_routes)
        .merge(tenant_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.is_empty() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(TENANT_HEADER),
            ])
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Tenant resolution middleware layer
///
/// Reads the tenant id from `X-Tenant-ID`, resolves it through the lifecycle
/// manager and injects the resolved tenant into request extensions.
async fn tenant_scope_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant_id = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing X-Tenant-ID header".to_string()))?
        .to_string();

    let resolved = state.tenants.resolve(&tenant_id).await?;

    req.extensions_mut().insert(resolved);

    Ok(next.run(req).await)
}
