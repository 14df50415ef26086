//! Integration tests for orderflow.
//!
//! # Running Tests
//!
//! ```bash
//! # Always-on checks (fixture wire format)
//! cargo test -p orderflow-integration-tests
//!
//! # Against live dependencies
//! cargo run -p orderflow-cli -- migrate
//! cargo run -p orderflow-service &
//! cargo test -p orderflow-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `wire_format` - The shared fixture decodes and validates
//! - `order_repository` - `PostgreSQL` store round trips (needs a database)
//! - `order_lookup` - Publish then look up through a running service

use orderflow_core::Order;
use secrecy::SecretString;
use uuid::Uuid;

/// The canonical order fixture, as published on the wire.
pub const ORDER_FIXTURE: &str = include_str!("../fixtures/order.json");

/// Decode [`ORDER_FIXTURE`].
///
/// # Panics
///
/// Panics if the fixture is not a decodable order.
#[must_use]
#[allow(clippy::expect_used)]
pub fn fixture_order() -> Order {
    Order::from_json(ORDER_FIXTURE.as_bytes()).expect("fixture must decode")
}

/// The fixture under a fresh `order_uid`, so reruns never collide.
#[must_use]
pub fn unique_order() -> Order {
    let mut order = fixture_order();
    let uid = Uuid::new_v4().simple().to_string();
    order.payment.transaction.clone_from(&uid);
    order.order_uid = uid;
    order
}

/// Base URL for the lookup API (configurable via environment).
#[must_use]
pub fn service_base_url() -> String {
    std::env::var("ORDERFLOW_BASE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string())
}

/// Database URL for store tests.
#[must_use]
pub fn database_url() -> SecretString {
    std::env::var("ORDERFLOW_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "postgres://localhost/orderflow".to_string())
        .into()
}
