/// Product endpoints (tenant-scoped)
///
/// # Endpoints
///
/// - `POST /v1/products` - Create product
/// - `GET /v1/products` - List products

use crate::{error::ApiResult, routes::Pagination};
use axum::{extract::Query, http::StatusCode, Extension, Json};
use serde::Serialize;
use taxbook_shared::models::{CreateProduct, Product};
use taxbook_shared::tenancy::ResolvedMySqlTenant;
use validator::Validate;

/// List products response
#[derive(Debug, Serialize)]
pub struct ListProductsResponse {
    pub products: Vec<Product>,
}

/// Create product
///
/// ```text
/// POST /v1/products
/// X-Tenant-ID: tenant_1735689600000_k3j9x0a2b
///
/// {
///   "name": "Cotton Yarn",
///   "hs_code": "5205.1100",
///   "uom": "KG",
///   "unit_price": "450.00",
///   "tax_rate": "18%"
/// }
/// ```
pub async fn create_product(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Json(req): Json<CreateProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    req.validate()?;

    let product = tenant.handle.models.products.create(req).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// List products
pub async fn list_products(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<ListProductsResponse>> {
    let products = tenant
        .handle
        .models
        .products
        .list(page.limit(), page.offset())
        .await?;

    Ok(Json(ListProductsResponse { products }))
}
