//! MedLens API
//!
//! Axum router, handlers and middleware for the MedLens aggregator.

pub mod handlers;
pub mod router;
pub mod security;
pub mod state;

#[cfg(feature = "openapi")]
pub mod openapi;

pub use router::create_router;
pub use state::AppState;
