//! User Segments Library
//!
//! Segment membership service: users, named segments, batch reconciliation
//! of a user's memberships, and an auditable history exported as CSV.
//!
//! # Layout
//! - [`store`]: RocksDB-backed entity store and history log
//! - [`reconcile`]: per-item add/remove engine producing [`reconcile::Outcome`]s
//! - [`reporter`]: outcome to `{status, message}` rendering
//! - [`export`]: history rows as CSV
//! - [`handlers`]: axum REST API

pub mod config;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod reconcile;
pub mod reporter;
pub mod store;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use parking_lot;
