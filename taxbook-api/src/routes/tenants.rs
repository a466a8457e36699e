/// Tenant administration endpoints
///
/// Back-office endpoints for provisioning tenants and reading tenant data by
/// physical database name.
///
/// # Endpoints
///
/// - `POST /v1/admin/tenants` - Provision a tenant
/// - `GET /v1/admin/tenants` - List active tenants
/// - `GET /v1/admin/tenants/incomplete` - List tenants stuck mid-provisioning
/// - `POST /v1/admin/tenants/:tenant_id/deactivate` - Deactivate a tenant
/// - `GET /v1/admin/databases/:database_name/invoices` - List a tenant's invoices

use crate::{app::AppState, error::ApiResult, routes::Pagination};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use taxbook_shared::models::{CreateTenant, Invoice, Tenant};
use taxbook_shared::tenancy::CreatedTenant;
use validator::Validate;

/// List tenants response
#[derive(Debug, Serialize)]
pub struct ListTenantsResponse {
    pub tenants: Vec<Tenant>,
}

/// Invoices of one tenant database
#[derive(Debug, Serialize)]
pub struct DatabaseInvoicesResponse {
    pub tenant_id: String,
    pub database_name: String,
    pub invoices: Vec<Invoice>,
}

/// Provision a tenant
///
/// Creates the tenant database, registers the tenant and initializes its
/// schema.
///
/// # Endpoint
///
/// ```text
/// POST /v1/admin/tenants
/// Content-Type: application/json
///
/// {
///   "seller_ntn_cnic": "T-001",
///   "seller_business_name": "Acme",
///   "seller_province": "Punjab",
///   "seller_address": "Mall Road, Lahore"
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "tenant": { "tenant_id": "tenant_1735689600000_k3j9x0a2b", ... },
///   "database_name": "tenant_T-001_1735689600000_p0q8r7s6t"
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Tax identifier or database name already registered
/// - `422 Unprocessable Entity`: Validation failed
/// - `500 Internal Server Error`: Provisioning stopped part way
/// - `503 Service Unavailable`: Database server unreachable
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenant>,
) -> ApiResult<(StatusCode, Json<CreatedTenant>)> {
    req.validate()?;

    let created = state.tenants.create(req).await?;

    tracing::info!(
        tenant_id = %created.tenant.tenant_id,
        database = %created.database_name,
        "Tenant created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// List active tenants
///
/// ```text
/// GET /v1/admin/tenants
/// ```
pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Json<ListTenantsResponse>> {
    let tenants = state.tenants.list_active().await?;
    Ok(Json(ListTenantsResponse { tenants }))
}

/// List active tenants whose provisioning never completed
///
/// ```text
/// GET /v1/admin/tenants/incomplete
/// ```
pub async fn list_incomplete_tenants(
    State(state): State<AppState>,
) -> ApiResult<Json<ListTenantsResponse>> {
    let tenants = state.tenants.list_incomplete().await?;
    Ok(Json(ListTenantsResponse { tenants }))
}

/// Deactivate a tenant
///
/// The tenant stops resolving and its cached connection is closed. Its
/// database and registry row are kept.
///
/// ```text
/// POST /v1/admin/tenants/tenant_1735689600000_k3j9x0a2b/deactivate
/// ```
///
/// # Errors
///
/// - `404 Not Found`: No active tenant with this id
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    let tenant = state.tenants.deactivate(&tenant_id).await?;
    Ok(Json(tenant))
}

/// List a tenant's invoices by database name
///
/// ```text
/// GET /v1/admin/databases/tenant_T-001_1735689600000_p0q8r7s6t/invoices?limit=20
/// ```
///
/// # Errors
///
/// - `404 Not Found`: No active tenant uses this database
pub async fn list_database_invoices(
    State(state): State<AppState>,
    Path(database_name): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<DatabaseInvoicesResponse>> {
    let resolved = state.tenants.resolve_by_database_name(&database_name).await?;

    let invoices = resolved
        .handle
        .models
        .invoices
        .list(page.limit(), page.offset())
        .await?;

    Ok(Json(DatabaseInvoicesResponse {
        tenant_id: resolved.tenant.tenant_id,
        database_name: resolved.tenant.database_name,
        invoices,
    }))
}
