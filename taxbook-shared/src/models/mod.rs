/// Database models
///
/// - `tenant`: tenant registry row (master database)
/// - `buyer`, `product`, `invoice`, `backup`: tenant-local entities, each
///   with a `*Store` bound to one tenant's pool
///
/// [`TenantModels`] is the full set of entity bindings realised against a
/// single tenant connection; the lifecycle manager builds it once per tenant
/// and caches it alongside the pool.

pub mod backup;
pub mod buyer;
pub mod invoice;
pub mod product;
pub mod tenant;

pub use backup::{BackupType, InvoiceBackup, InvoiceBackupStore, InvoiceBackupSummary, InvoiceBackupSummaryStore};
pub use buyer::{Buyer, BuyerStore, CreateBuyer};
pub use invoice::{
    CreateInvoice, CreateInvoiceItem, Invoice, InvoiceError, InvoiceItem, InvoiceItemStore,
    InvoiceStatus, InvoiceStore, InvoiceWithItems,
};
pub use product::{CreateProduct, Product, ProductStore};
pub use tenant::{CreateTenant, NewTenantRecord, ProvisioningState, Tenant};

use sqlx::MySqlPool;

/// Entity bindings for one tenant database
#[derive(Debug, Clone)]
pub struct TenantModels {
    pub buyers: BuyerStore,
    pub products: ProductStore,
    pub invoices: InvoiceStore,
    pub invoice_items: InvoiceItemStore,
    pub invoice_backups: InvoiceBackupStore,
    pub invoice_backup_summaries: InvoiceBackupSummaryStore,
}

impl TenantModels {
    /// Binds every tenant-local entity to `pool`
    pub fn bind(pool: &MySqlPool) -> Self {
        Self {
            buyers: BuyerStore::new(pool.clone()),
            products: ProductStore::new(pool.clone()),
            invoices: InvoiceStore::new(pool.clone()),
            invoice_items: InvoiceItemStore::new(pool.clone()),
            invoice_backups: InvoiceBackupStore::new(pool.clone()),
            invoice_backup_summaries: InvoiceBackupSummaryStore::new(pool.clone()),
        }
    }
}
