//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//! GET  /order/{uid}            - Order lookup (JSON)
//! ```

pub mod orders;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Create the order lookup router.
pub fn routes() -> Router<AppState> {
    Router::new().route("/order/{uid}", get(orders::show))
}
