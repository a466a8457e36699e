/// Invoice endpoints (tenant-scoped)
///
/// Every write keeps a JSON snapshot of the invoice in `invoice_backups` so
/// a tenant can reconstruct what was sent to FBR at each step. Snapshots
/// taken after a create or post are best effort: the invoice change has
/// already committed, so a failed snapshot is logged and the write succeeds.
///
/// # Endpoints
///
/// - `POST /v1/invoices` - Create draft invoice
/// - `GET /v1/invoices` - List invoices
/// - `GET /v1/invoices/:id` - Get invoice with its lines
/// - `POST /v1/invoices/:id/post` - Record the FBR-issued invoice number
/// - `GET /v1/invoices/:id/backups` - List snapshots
/// - `POST /v1/invoices/:id/backups` - Take a snapshot

use crate::{
    error::{ApiError, ApiResult},
    routes::Pagination,
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use taxbook_shared::models::{
    BackupType, CreateInvoice, Invoice, InvoiceBackup, InvoiceBackupSummary, InvoiceWithItems,
    TenantModels,
};
use taxbook_shared::tenancy::ResolvedMySqlTenant;
use validator::Validate;

/// List invoices response
#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<Invoice>,
}

/// Post invoice request
#[derive(Debug, Deserialize, Validate)]
pub struct PostInvoiceRequest {
    #[validate(length(min = 1, max = 100, message = "FBR invoice number must be 1-100 characters"))]
    pub fbr_invoice_number: String,
}

/// Create backup request
#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub backup_type: BackupType,
}

/// Backups of one invoice
#[derive(Debug, Serialize)]
pub struct ListBackupsResponse {
    pub backups: Vec<InvoiceBackup>,
    pub summary: Option<InvoiceBackupSummary>,
}

/// Create a draft invoice
///
/// Line amounts are computed from quantity, unit price, discount and rate.
/// A `draft` snapshot is recorded once the invoice is stored; if that fails
/// the invoice is still returned with `201`.
///
/// ```text
/// POST /v1/invoices
/// X-Tenant-ID: tenant_1735689600000_k3j9x0a2b
///
/// {
///   "invoice_number": "INV-2025-0001",
///   "invoice_date": "2025-01-15",
///   "buyer_ntn_cnic": "1234567-8",
///   "buyer_business_name": "Karachi Traders",
///   "buyer_province": "Sindh",
///   "buyer_registration_type": "Registered",
///   "items": [
///     { "hs_code": "5205.1100", "product_description": "Cotton Yarn",
///       "rate": "18%", "uom": "KG", "quantity": "10", "unit_price": "450" }
///   ]
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Invoice number already used
/// - `422 Unprocessable Entity`: Validation failed or unknown tax rate
pub async fn create_invoice(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Json(req): Json<CreateInvoice>,
) -> ApiResult<(StatusCode, Json<InvoiceWithItems>)> {
    req.validate()?;

    let models = &tenant.handle.models;
    let created = models.invoices.create(req).await?;

    snapshot_after_write(models, &created, BackupType::Draft).await;

    tracing::info!(
        tenant_id = %tenant.tenant.tenant_id,
        invoice_id = created.invoice.id,
        invoice_number = %created.invoice.invoice_number,
        "Invoice created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// List invoices, newest first
pub async fn list_invoices(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<ListInvoicesResponse>> {
    let invoices = tenant
        .handle
        .models
        .invoices
        .list(page.limit(), page.offset())
        .await?;

    Ok(Json(ListInvoicesResponse { invoices }))
}

/// Get an invoice with its lines
///
/// # Errors
///
/// - `404 Not Found`: No invoice with this id
pub async fn get_invoice(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Path(id): Path<i64>,
) -> ApiResult<Json<InvoiceWithItems>> {
    let invoice = load_invoice(&tenant.handle.models, id).await?;
    Ok(Json(invoice))
}

/// Record the FBR-issued number on a draft invoice
///
/// ```text
/// POST /v1/invoices/42/post
/// X-Tenant-ID: tenant_1735689600000_k3j9x0a2b
///
/// { "fbr_invoice_number": "7000007DI1747119701593" }
/// ```
///
/// # Errors
///
/// - `404 Not Found`: No invoice with this id
/// - `409 Conflict`: Invoice is not a draft
pub async fn post_invoice(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Path(id): Path<i64>,
    Json(req): Json<PostInvoiceRequest>,
) -> ApiResult<Json<InvoiceWithItems>> {
    req.validate()?;

    let models = &tenant.handle.models;

    if models
        .invoices
        .mark_posted(id, req.fbr_invoice_number.trim())
        .await?
        .is_none()
    {
        // Distinguish a missing invoice from one that was already posted
        return match models.invoices.find_by_id(id).await? {
            Some(_) => Err(ApiError::Conflict(format!("Invoice {} is not a draft", id))),
            None => Err(ApiError::NotFound(format!("Invoice not found: {}", id))),
        };
    }

    let posted = load_invoice(models, id).await?;
    snapshot_after_write(models, &posted, BackupType::Posted).await;

    tracing::info!(
        tenant_id = %tenant.tenant.tenant_id,
        invoice_id = id,
        "Invoice posted"
    );

    Ok(Json(posted))
}

/// List snapshots of an invoice, newest first
pub async fn list_backups(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ListBackupsResponse>> {
    let models = &tenant.handle.models;

    if models.invoices.find_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Invoice not found: {}", id)));
    }

    let backups = models.invoice_backups.list_for_invoice(id).await?;
    let summary = models.invoice_backup_summaries.find_for_invoice(id).await?;

    Ok(Json(ListBackupsResponse { backups, summary }))
}

/// Take a snapshot of an invoice as it is now
///
/// ```text
/// POST /v1/invoices/42/backups
///
/// { "backup_type": "edit" }
/// ```
pub async fn create_backup(
    Extension(tenant): Extension<ResolvedMySqlTenant>,
    Path(id): Path<i64>,
    Json(req): Json<CreateBackupRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceBackup>)> {
    let models = &tenant.handle.models;

    let invoice = load_invoice(models, id).await?;
    let backup = snapshot(models, &invoice, req.backup_type).await?;

    Ok((StatusCode::CREATED, Json(backup)))
}

async fn load_invoice(models: &TenantModels, id: i64) -> ApiResult<InvoiceWithItems> {
    models
        .invoices
        .find_with_items(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Invoice not found: {}", id)))
}

async fn snapshot(
    models: &TenantModels,
    invoice: &InvoiceWithItems,
    backup_type: BackupType,
) -> ApiResult<InvoiceBackup> {
    let data = serde_json::to_value(invoice)
        .map_err(|e| ApiError::InternalError(format!("Cannot serialize invoice: {}", e)))?;

    let backup = models
        .invoice_backups
        .record(invoice.invoice.id, backup_type, &data)
        .await?;

    Ok(backup)
}

/// Snapshot following a committed write; failures are only logged
async fn snapshot_after_write(
    models: &TenantModels,
    invoice: &InvoiceWithItems,
    backup_type: BackupType,
) -> Option<InvoiceBackup> {
    match snapshot(models, invoice, backup_type).await {
        Ok(backup) => Some(backup),
        Err(e) => {
            tracing::warn!(
                invoice_id = invoice.invoice.id,
                backup_type = ?backup_type,
                error = %e,
                "Invoice snapshot failed after commit"
            );
            None
        }
    }
}
