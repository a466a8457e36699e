//! # Taxbook Worker Library
//!
//! Background jobs that keep the tenant registry consistent with the
//! tenant databases.
//!
//! ## Modules
//!
//! - `config`: Configuration management
//! - `reconciler`: Resumes tenants whose provisioning was interrupted

pub mod config;
pub mod reconciler;
