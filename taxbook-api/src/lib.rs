//! # Taxbook API Server Library
//!
//! HTTP surface of the multi-tenant FBR invoicing backend. Tenant-scoped
//! requests carry an `X-Tenant-ID` header; the router resolves it to the
//! tenant's own database through the lifecycle manager before any handler
//! runs.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
