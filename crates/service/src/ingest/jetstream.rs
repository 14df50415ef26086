//! NATS `JetStream` implementations of the broker seams.
//!
//! The ingestion subject is read through a durable pull consumer with
//! explicit acks and at most one unacknowledged message, which gives a single
//! ordered partition. The stream sequence serves as the offset; committing
//! acks the message.
//!
//! A message that was fetched but never committed is negatively acknowledged
//! before the next fetch, so the server redelivers it immediately.

use std::collections::HashMap;

use async_nats::HeaderMap;
use async_nats::jetstream::{self, AckKind, Context};
use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use secrecy::ExposeSecret;

use super::{BrokerError, Message, MessageSink, MessageSource};
use crate::config::BrokerConfig;

/// Header carrying the message key, which NATS has no native slot for.
pub const HEADER_MESSAGE_KEY: &str = "message_key";

/// Connect to NATS and return a `JetStream` context.
///
/// # Errors
///
/// Returns `BrokerError::Connection` if the server is unreachable or rejects
/// the credentials.
pub async fn connect(config: &BrokerConfig) -> Result<Context, BrokerError> {
    let options = match (&config.user, &config.password) {
        (Some(user), Some(password)) => async_nats::ConnectOptions::with_user_and_password(
            user.clone(),
            password.expose_secret().to_owned(),
        ),
        _ => async_nats::ConnectOptions::new(),
    };

    let client = options
        .name("orderflow-service")
        .connect(config.url.as_str())
        .await
        .map_err(|e| BrokerError::Connection(format!("{}: {e}", config.url)))?;

    tracing::info!(url = %config.url, "connected to NATS");
    Ok(jetstream::new(client))
}

/// Create `name` capturing `subject` unless it already exists.
async fn ensure_stream(
    context: &Context,
    name: &str,
    subject: &str,
) -> Result<jetstream::stream::Stream, BrokerError> {
    context
        .get_or_create_stream(jetstream::stream::Config {
            name: name.to_owned(),
            subjects: vec![subject.to_owned()],
            retention: jetstream::stream::RetentionPolicy::Limits,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| BrokerError::Stream(format!("{name}: {e}")))
}

/// Pull-based [`MessageSource`] over the ingestion stream.
pub struct JetStreamSource {
    messages: pull::Stream,
    in_flight: Option<jetstream::Message>,
}

impl JetStreamSource {
    /// Ensure the ingestion stream and durable consumer exist and start pulling.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the stream or consumer cannot be set up.
    pub async fn connect(context: &Context, config: &BrokerConfig) -> Result<Self, BrokerError> {
        let stream = ensure_stream(context, &config.stream, &config.subject).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &config.consumer,
                pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Consumer(format!("{}: {e}", config.consumer)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Consumer(format!("{}: {e}", config.consumer)))?;

        tracing::info!(
            stream = %config.stream,
            subject = %config.subject,
            consumer = %config.consumer,
            "pull consumer ready"
        );

        Ok(Self {
            messages,
            in_flight: None,
        })
    }
}

fn to_message(message: &jetstream::Message) -> Result<Message, BrokerError> {
    let info = message
        .info()
        .map_err(|e| BrokerError::Fetch(format!("missing delivery metadata: {e}")))?;

    let headers: HashMap<String, String> = message
        .headers
        .iter()
        .flat_map(HeaderMap::iter)
        .filter_map(|(name, values)| {
            values
                .last()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    Ok(Message {
        key: headers
            .get(HEADER_MESSAGE_KEY)
            .map(|key| Bytes::from(key.clone())),
        value: message.payload.clone(),
        headers,
        partition: 0,
        offset: info.stream_sequence,
        topic: message.subject.to_string(),
    })
}

/// Track `next` as the in-flight delivery and convert it.
///
/// A delivery that cannot be converted is still tracked, so the next fetch
/// NAKs it instead of leaving it unacknowledged until `ack_wait` expires.
fn take_delivery(
    in_flight: &mut Option<jetstream::Message>,
    next: jetstream::Message,
) -> Result<Message, BrokerError> {
    let message = to_message(&next);
    *in_flight = Some(next);
    message
}

#[async_trait]
impl MessageSource for JetStreamSource {
    async fn fetch(&mut self) -> Result<Message, BrokerError> {
        if let Some(uncommitted) = self.in_flight.take() {
            uncommitted
                .ack_with(AckKind::Nak(None))
                .await
                .map_err(|e| BrokerError::Ack(e.to_string()))?;
        }

        let next = self
            .messages
            .next()
            .await
            .ok_or_else(|| BrokerError::Fetch("message stream closed".to_owned()))?
            .map_err(|e| BrokerError::Fetch(e.to_string()))?;

        take_delivery(&mut self.in_flight, next)
    }

    async fn commit(&mut self, message: &Message) -> Result<(), BrokerError> {
        let in_flight = self
            .in_flight
            .take()
            .ok_or_else(|| BrokerError::Ack(format!("offset {} is not in flight", message.offset)))?;

        in_flight
            .double_ack()
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}

/// [`MessageSink`] publishing to `JetStream` and waiting for the stream's ack.
#[derive(Clone)]
pub struct JetStreamSink {
    context: Context,
}

impl JetStreamSink {
    /// Ensure `stream` exists and captures `subject`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Stream` if the stream cannot be created.
    pub async fn connect(context: Context, stream: &str, subject: &str) -> Result<Self, BrokerError> {
        ensure_stream(&context, stream, subject).await?;
        Ok(Self { context })
    }
}

#[async_trait]
impl MessageSink for JetStreamSink {
    async fn send(
        &self,
        topic: &str,
        key: Option<Bytes>,
        value: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let mut nats_headers = HeaderMap::new();
        for (name, value) in headers {
            nats_headers.insert(name.as_str(), value.as_str());
        }
        if let Some(key) = key {
            nats_headers.insert(HEADER_MESSAGE_KEY, String::from_utf8_lossy(&key).as_ref());
        }

        self.context
            .publish_with_headers(topic.to_owned(), nats_headers, value)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        Ok(())
    }
}
