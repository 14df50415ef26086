//! The shared fixture matches the ingestion wire format.
//!
//! Runs without any external services.

use orderflow_core::{Order, validate};
use orderflow_integration_tests::{ORDER_FIXTURE, fixture_order, unique_order};
use serde_json::Value;

#[test]
fn test_fixture_is_a_valid_order() {
    let order = fixture_order();

    assert!(validate(&order).is_ok());
    assert_eq!(order.payment.transaction, order.order_uid);
    assert!(order.items.iter().all(|item| item.track_number == order.track_number));
}

#[test]
fn test_encoding_preserves_every_fixture_field() {
    let original: Value = serde_json::from_str(ORDER_FIXTURE).expect("fixture is JSON");
    let encoded = serde_json::to_value(fixture_order()).expect("order encodes");

    assert_eq!(encoded, original);
}

#[test]
fn test_unique_orders_stay_valid() {
    let first = unique_order();
    let second = unique_order();

    assert_ne!(first.order_uid, second.order_uid);
    assert!(validate(&first).is_ok());
    assert!(validate(&second).is_ok());
}

#[test]
fn test_fixture_with_mismatched_transaction_is_rejected() {
    let mut order: Order = fixture_order();
    order.payment.transaction = "other".to_string();

    let err = validate(&order).expect_err("must be rejected");
    assert!(err.to_string().contains("payment.transaction must equal order_uid"));
}
