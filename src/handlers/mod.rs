//! HTTP API Handlers
//!
//! One submodule per resource; `router` wires them together.

// Core modules
pub mod router;
pub mod state;
pub mod types;

// Health and metrics
pub mod health;

// Catalog management
pub mod segments;
pub mod users;

// Memberships and history
pub mod memberships;
pub mod reports;

// Test utilities (compiled only in test builds)
#[cfg(test)]
pub mod test_helpers;

pub use router::build_router;
pub use state::{AppState, SegmentService};
