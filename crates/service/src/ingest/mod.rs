//! Order ingestion from the message broker.
//!
//! # Flow
//!
//! ```text
//! MessageSource ──fetch──▶ Consumer ──decode/validate──▶ OrderService
//!       ▲                     │
//!       └──────commit─────────┤ (poison) ──send──▶ MessageSink (dead letters)
//! ```
//!
//! Delivery is at-least-once. A message stays redeliverable until
//! [`MessageSource::commit`] is called for it, and the consumer calls it from
//! exactly one place.

pub mod consumer;
pub mod jetstream;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use consumer::{Consumer, ConsumerSettings, Disposition};
pub use jetstream::{JetStreamSink, JetStreamSource};

/// Header naming why a message was dead-lettered.
pub const HEADER_ERROR_REASON: &str = "error_reason";
/// Header carrying the decoder or validator message.
pub const HEADER_ERROR_DETAILS: &str = "error_details";
/// Header carrying the topic the message was fetched from.
pub const HEADER_ORIGINAL_TOPIC: &str = "original_topic";
/// Header carrying the source offset as a decimal string.
pub const HEADER_ORIGINAL_OFFSET: &str = "original_offset";

/// Errors from the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("stream setup failed: {0}")]
    Stream(String),

    #[error("consumer setup failed: {0}")]
    Consumer(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("commit failed: {0}")]
    Ack(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: HashMap<String, String>,
    pub partition: i32,
    pub offset: u64,
    pub topic: String,
}

/// Why a message was routed to the dead-letter destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The body is not a decodable order.
    JsonUnmarshalFailed,
    /// The order decoded but broke a validation rule.
    ValidationFailed,
}

impl DeadLetterReason {
    /// Value of the `error_reason` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JsonUnmarshalFailed => "json_unmarshal_failed",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At-least-once message fetch and commit over one partition.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// Until the previous message is committed, the next fetch returns it
    /// again.
    async fn fetch(&mut self) -> Result<Message, BrokerError>;

    /// Advance the durable read position past `message`.
    async fn commit(&mut self, message: &Message) -> Result<(), BrokerError>;
}

/// Durable publish of a message to a topic.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: Option<Bytes>,
        value: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_header_values() {
        assert_eq!(
            DeadLetterReason::JsonUnmarshalFailed.as_str(),
            "json_unmarshal_failed"
        );
        assert_eq!(
            DeadLetterReason::ValidationFailed.to_string(),
            "validation_failed"
        );
    }
}
