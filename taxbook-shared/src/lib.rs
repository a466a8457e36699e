//! # Taxbook Shared Library
//!
//! Tenant database lifecycle for the Taxbook FBR invoicing backend, shared by
//! the API server and the provisioning worker.
//!
//! ## Module Organization
//!
//! - `db`: connection factory and master database migrations
//! - `models`: tenant registry row and tenant-local entities
//! - `schema`: tenant schema initializer and buyer index repair
//! - `tenancy`: provisioning and the tenant connection cache
//! - `error`: tenant lifecycle error type

pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod tenancy;

pub use error::{TenantError, TenantResult};

/// Current version of the Taxbook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
