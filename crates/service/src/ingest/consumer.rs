//! The ingestion loop.
//!
//! Each message goes through fetch, decode, validate, apply and commit.
//! Decode and validation failures are routed to the dead-letter topic and
//! then committed. A failed apply or a failed dead-letter send is not
//! committed, so the broker hands the same message back on the next fetch.
//!
//! Cancellation is checked while waiting for a message and while backing off.
//! An apply or commit that has started runs to completion.

use std::collections::HashMap;
use std::time::Duration;

use orderflow_core::{Order, validate};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{
    BrokerError, DeadLetterReason, HEADER_ERROR_DETAILS, HEADER_ERROR_REASON,
    HEADER_ORIGINAL_OFFSET, HEADER_ORIGINAL_TOPIC, Message, MessageSink, MessageSource,
};
use crate::config::BrokerConfig;
use crate::services::OrderService;

/// What to do with a message once it has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Advance past the message.
    Commit,
    /// Leave it uncommitted so it is delivered again.
    Retry,
}

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub dead_letter_topic: String,
    /// Deadline for one dead-letter send. `None` waits indefinitely.
    pub dead_letter_timeout: Option<Duration>,
    /// Pause before fetching again after a retry or a fetch error.
    pub retry_backoff: Duration,
}

impl From<&BrokerConfig> for ConsumerSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            dead_letter_topic: config.dead_letter_subject.clone(),
            dead_letter_timeout: config.dead_letter_timeout,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Single worker draining one partition, one message at a time.
pub struct Consumer<S, K> {
    source: S,
    handler: Handler<K>,
}

/// Everything a message is handled with, apart from the source.
struct Handler<K> {
    dead_letters: K,
    service: OrderService,
    settings: ConsumerSettings,
}

impl<S, K> Consumer<S, K>
where
    S: MessageSource,
    K: MessageSink,
{
    pub const fn new(
        source: S,
        dead_letters: K,
        service: OrderService,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            source,
            handler: Handler {
                dead_letters,
                service,
                settings,
            },
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            dead_letter_topic = %self.handler.settings.dead_letter_topic,
            "order consumer started"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                fetched = self.source.fetch() => fetched,
            };

            let disposition = match fetched {
                Ok(message) => {
                    let disposition = self.handler.handle(&message).await;
                    if disposition == Disposition::Commit {
                        self.commit(&message).await;
                    }
                    disposition
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch message");
                    Disposition::Retry
                }
            };

            if disposition == Disposition::Retry
                && !back_off(self.handler.settings.retry_backoff, &cancel).await
            {
                break;
            }
        }

        tracing::info!("order consumer stopped");
    }

    async fn commit(&mut self, message: &Message) {
        if let Err(e) = self.source.commit(message).await {
            // The broker redelivers it; applying an order twice is an upsert.
            tracing::warn!(offset = message.offset, error = %e, "failed to commit message");
        }
    }
}

impl<K: MessageSink> Handler<K> {
    /// Decide the fate of one message. Never commits.
    #[instrument(
        skip(self, message),
        fields(topic = %message.topic, partition = message.partition, offset = message.offset)
    )]
    async fn handle(&self, message: &Message) -> Disposition {
        let order = match Order::from_json(&message.value) {
            Ok(order) => order,
            Err(e) => {
                return self
                    .dead_letter(message, DeadLetterReason::JsonUnmarshalFailed, &e.to_string())
                    .await;
            }
        };

        if let Err(e) = validate(&order) {
            return self
                .dead_letter(message, DeadLetterReason::ValidationFailed, &e.to_string())
                .await;
        }

        let order_uid = order.order_uid.clone();
        match self.service.process_new_order(order).await {
            Ok(()) => {
                tracing::info!(%order_uid, "order stored");
                Disposition::Commit
            }
            Err(e) => {
                tracing::warn!(%order_uid, error = %e, "failed to store order, will retry");
                Disposition::Retry
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &Message,
        reason: DeadLetterReason,
        details: &str,
    ) -> Disposition {
        match self.send_dead_letter(message, reason, details).await {
            Ok(()) => {
                tracing::warn!(%reason, details, "message dead-lettered");
                Disposition::Commit
            }
            Err(e) => {
                tracing::error!(
                    %reason,
                    error = %e,
                    "dead-letter send failed, withholding commit"
                );
                Disposition::Retry
            }
        }
    }

    /// Send within `dead_letter_timeout`, if one is set.
    async fn send_dead_letter(
        &self,
        message: &Message,
        reason: DeadLetterReason,
        details: &str,
    ) -> Result<(), BrokerError> {
        let headers = dead_letter_headers(message, reason, details);
        let send = self.dead_letters.send(
            &self.settings.dead_letter_topic,
            message.key.clone(),
            message.value.clone(),
            headers,
        );

        match self.settings.dead_letter_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .unwrap_or(Err(BrokerError::Timeout(limit))),
            None => send.await,
        }
    }
}

/// Returns `false` if cancelled during the pause.
async fn back_off(pause: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(pause) => true,
    }
}

fn dead_letter_headers(
    message: &Message,
    reason: DeadLetterReason,
    details: &str,
) -> HashMap<String, String> {
    HashMap::from([
        (HEADER_ERROR_REASON.to_owned(), reason.as_str().to_owned()),
        (HEADER_ERROR_DETAILS.to_owned(), details.to_owned()),
        (HEADER_ORIGINAL_TOPIC.to_owned(), message.topic.clone()),
        (HEADER_ORIGINAL_OFFSET.to_owned(), message.offset.to_string()),
    ])
}
