//! In-memory doubles for the store and broker seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use orderflow_core::{Delivery, Item, Order, Payment};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::db::{OrderStore, RepositoryError};
use crate::ingest::{BrokerError, Message, MessageSink, MessageSource};

#[allow(clippy::unwrap_used)]
fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// A fully valid order with the given uid.
#[allow(clippy::unwrap_used)]
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_owned(),
        track_number: "WBILMTESTTRACK".to_owned(),
        entry: "WBIL".to_owned(),
        delivery: Delivery {
            name: "Test Testov".to_owned(),
            phone: "+9720000000".to_owned(),
            zip: "2639809".to_owned(),
            city: "Kiryat Mozkin".to_owned(),
            address: "Ploshad Mira 15".to_owned(),
            region: "Kraiot".to_owned(),
            email: "test@gmail.com".to_owned(),
        },
        payment: Payment {
            transaction: order_uid.to_owned(),
            request_id: String::new(),
            currency: "USD".to_owned(),
            provider: "wbpay".to_owned(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_owned(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9_934_930,
            track_number: "WBILMTESTTRACK".to_owned(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_owned(),
            name: "Mascaras".to_owned(),
            sale: 30,
            size: "0".to_owned(),
            total_price: 317,
            nm_id: 2_389_212,
            brand: "Vivienne Sabo".to_owned(),
            status: 202,
        }],
        locale: "en".to_owned(),
        internal_signature: String::new(),
        customer_id: "test".to_owned(),
        delivery_service: "meest".to_owned(),
        shardkey: "9".to_owned(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_owned(),
    }
}

/// A store error the consumer treats as transient.
pub fn unavailable() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

// =============================================================================
// Store
// =============================================================================

/// `HashMap`-backed [`OrderStore`] that counts calls.
#[derive(Default)]
pub struct MemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    saves: AtomicUsize,
    reads: AtomicUsize,
    failing_saves: AtomicUsize,
    failing_reads: AtomicUsize,
    save_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryStore {
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::default();
        locked(&store.orders).extend(
            orders
                .into_iter()
                .map(|order| (order.order_uid.clone(), order)),
        );
        store
    }

    /// Make the next `count` saves fail with a transient error.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` single-order reads fail with a transient error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Make saves wait for a notification on the returned gate.
    pub fn hold_saves(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *locked(&self.save_gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        locked(&self.orders).get(order_uid).cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(unavailable());
        }

        let gate = locked(&self.save_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        locked(&self.orders).insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(unavailable());
        }

        locked(&self.orders)
            .get(order_uid)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_last_n_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = locked(&self.orders).values().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        orders.truncate(limit);
        Ok(orders)
    }
}

// =============================================================================
// Broker
// =============================================================================

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    fetched: Vec<u64>,
    committed: Vec<u64>,
}

/// Single-partition queue. Clones share state.
///
/// The front message is redelivered until committed. Once drained, the next
/// fetch cancels `cancel` and never resolves, which stops the consumer.
#[derive(Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<QueueState>>,
    cancel: CancellationToken,
}

impl MemoryQueue {
    pub const TOPIC: &'static str = "orders.created";

    pub fn new(cancel: CancellationToken, bodies: &[&[u8]]) -> Self {
        let pending = bodies
            .iter()
            .zip(0_u64..)
            .map(|(body, offset)| Message {
                key: Some(Bytes::from(format!("key-{offset}"))),
                value: Bytes::copy_from_slice(body),
                headers: HashMap::new(),
                partition: 0,
                offset,
                topic: Self::TOPIC.to_owned(),
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(QueueState {
                pending,
                ..QueueState::default()
            })),
            cancel,
        }
    }

    /// Offsets in the order they were fetched, repeats included.
    pub fn fetched(&self) -> Vec<u64> {
        locked(&self.state).fetched.clone()
    }

    pub fn committed(&self) -> Vec<u64> {
        locked(&self.state).committed.clone()
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn fetch(&mut self) -> Result<Message, BrokerError> {
        let next = {
            let mut state = locked(&self.state);
            let next = state.pending.front().cloned();
            if let Some(message) = &next {
                state.fetched.push(message.offset);
            }
            next
        };

        match next {
            Some(message) => Ok(message),
            None => {
                self.cancel.cancel();
                std::future::pending().await
            }
        }
    }

    async fn commit(&mut self, message: &Message) -> Result<(), BrokerError> {
        let mut state = locked(&self.state);
        if state.pending.front().map(|m| m.offset) == Some(message.offset) {
            state.pending.pop_front();
        }
        state.committed.push(message.offset);
        Ok(())
    }
}

/// A message accepted by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub topic: String,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: HashMap<String, String>,
}

/// [`MessageSink`] that records what it was sent.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing_sends: Arc<AtomicUsize>,
    stalling_sends: Arc<AtomicUsize>,
}

impl RecordingSink {
    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` sends hang forever.
    pub fn stall_next_sends(&self, count: usize) {
        self.stalling_sends.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        locked(&self.sent).clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(
        &self,
        topic: &str,
        key: Option<Bytes>,
        value: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BrokerError::Publish("no responders".to_owned()));
        }
        let stalling = self
            .stalling_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if stalling.is_ok() {
            return std::future::pending().await;
        }

        locked(&self.sent).push(SentMessage {
            topic: topic.to_owned(),
            key,
            value,
            headers,
        });
        Ok(())
    }
}
