/// Buyer endpoints (tenant-scoped)
///
/// # Endpoints
///
/// - `POST /v1/buyers` - Create buyer
/// - `GET /v1/buyers` - List buyers, or look them up by NTN/CNIC
///
/// Buyer NTN/CNIC values are not unique: synced data may carry the same
/// identifier more than once, so a lookup returns every match.

use crate::{error::ApiResult, routes::Pagination};
use axum::{extract::Query, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use taxbook_shared::models::{Buyer, CreateBuyer};
use taxbook_shared::tenancy::ResolvedMySqlTenant;
use validator::Validate;

/// Buyer list query (`?ntn_cnic=&limit=&offset=`)
#[derive(Debug, Deserialize)]
pub struct BuyerQuery {
    pub ntn_cnic: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl BuyerQuery {
    fn page(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// List buyers response
#[derive(Debug, Serialize)]
pub struct ListBuyersResponse {
    pub buyers: Vec<Buyer>,
    pub total: i64,
}

/// Create buyer
///
/// ```text
/// POST /v1/buyers
/// X-Tenant-ID: tenant_1735689600000_k3j9x0a2b
///
/// {
///   "buyer_ntn_cnic": "1234567-8",
///   "buyer_business_name": "Karachi Traders",
///   "buyer_province": "Sindh",
///   "buyer_registration_type": "Registered"
/// }
/// ```
pub async fn create_buyer(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Json(req): Json<CreateBuyer>,
) -> ApiResult<(StatusCode, Json<Buyer>)> {
    req.validate()?;

    let buyer = tenant.handle.models.buyers.create(req).await?;

    Ok((StatusCode::CREATED, Json(buyer)))
}

/// List buyers
///
/// ```text
/// GET /v1/buyers?ntn_cnic=1234567-8
/// X-Tenant-ID: tenant_1735689600000_k3j9x0a2b
/// ```
pub async fn list_buyers(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Query(query): Query<BuyerQuery>,
) -> ApiResult<Json<ListBuyersResponse>> {
    let store = &tenant.handle.models.buyers;

    let buyers = match query.ntn_cnic.as_deref().map(str::trim) {
        Some(ntn_cnic) if !ntn_cnic.is_empty() => store.find_by_ntn_cnic(ntn_cnic).await?,
        _ => {
            let page = query.page();
            store.list(page.limit(), page.offset()).await?
        }
    };

    let total = store.count().await?;

    Ok(Json(ListBuyersResponse { buyers, total }))
}
