//! The order aggregate.
//!
//! Field names follow the JSON body of an ingested message exactly, so the
//! same types decode queue messages and encode the HTTP lookup response.
//!
//! Every struct is `#[serde(default)]`: a missing field decodes to its zero
//! value and is reported by [`crate::validate`], not by the decoder. Only
//! malformed JSON or mistyped values fail decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate root: one customer order with its delivery, payment and items.
///
/// `order_uid` is the idempotency key for ingestion and the cache key for
/// lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    /// Creation time, RFC 3339 on the wire.
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Recipient and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    /// Kept as the raw string so an unparsable address is a validation
    /// failure rather than a decode failure.
    pub email: String,
}

/// Payment details. Amounts are in minor currency units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    /// Must equal [`Order::order_uid`].
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// One order line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    /// Must equal [`Order::track_number`].
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Decode an order from a message body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not JSON or a field has
    /// the wrong type.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
