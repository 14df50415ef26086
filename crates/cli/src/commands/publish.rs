//! Publish an order file to the ingestion subject.
//!
//! Useful for exercising a running service by hand. By default the body is
//! decoded and validated first so a typo does not end up dead-lettered;
//! `--unchecked` sends it untouched, which is how to test the dead-letter path.
//!
//! # Environment Variables
//!
//! Uses the same broker settings as the service (`NATS_URL`, `NATS_USER`,
//! `NATS_PASSWORD`, `ORDERS_STREAM`, `ORDERS_SUBJECT`).

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use orderflow_core::{Order, validate};
use orderflow_service::config::BrokerConfig;
use orderflow_service::ingest::{JetStreamSink, MessageSink, jetstream};

use super::CommandError;

/// Flags for [`run`].
#[derive(Debug, Default)]
pub struct PublishOptions {
    pub key: Option<String>,
    pub subject: Option<String>,
    pub unchecked: bool,
}

/// Pick the message key, checking the body unless told not to.
fn message_key(body: &[u8], options: &PublishOptions) -> Result<Option<String>, CommandError> {
    if options.unchecked {
        return Ok(options.key.clone());
    }

    let order = Order::from_json(body)?;
    validate(&order)?;
    Ok(Some(options.key.clone().unwrap_or(order.order_uid)))
}

/// Publish the file at `path` and wait for the stream to acknowledge it.
///
/// # Errors
///
/// Returns `CommandError` if the file cannot be read, fails checks, or the
/// broker rejects the publish.
pub async fn run(path: &Path, options: PublishOptions) -> Result<(), CommandError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|source| CommandError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let key = message_key(&body, &options)?;
    let broker = BrokerConfig::from_env()?;
    let subject = options.subject.unwrap_or_else(|| broker.subject.clone());

    let context = jetstream::connect(&broker).await?;
    let sink = JetStreamSink::connect(context, &broker.stream, &subject).await?;
    sink.send(&subject, key.clone().map(Bytes::from), Bytes::from(body), HashMap::new())
        .await?;

    tracing::info!(%subject, key = key.as_deref().unwrap_or(""), "Order published");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ORDER: &[u8] = include_bytes!("../../../integration-tests/fixtures/order.json");

    #[test]
    fn test_key_defaults_to_order_uid() {
        let key = message_key(ORDER, &PublishOptions::default()).unwrap();
        assert_eq!(key.as_deref(), Some("b563feb7b2b84b6test"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let options = PublishOptions {
            key: Some("replay-1".to_string()),
            ..PublishOptions::default()
        };
        let key = message_key(ORDER, &options).unwrap();
        assert_eq!(key.as_deref(), Some("replay-1"));
    }

    #[test]
    fn test_invalid_body_is_rejected() {
        let err = message_key(b"{\"order_uid\": \"x\"}", &PublishOptions::default()).unwrap_err();
        assert!(matches!(err, CommandError::Invalid(_)));

        let err = message_key(b"not json", &PublishOptions::default()).unwrap_err();
        assert!(matches!(err, CommandError::Decode(_)));
    }

    #[test]
    fn test_unchecked_skips_decoding() {
        let options = PublishOptions {
            unchecked: true,
            ..PublishOptions::default()
        };
        assert_eq!(message_key(b"not json", &options).unwrap(), None);
    }
}
