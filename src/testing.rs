//! In-memory stand-ins for the broker, the store and the dead-letter topic.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::messaging::{DeadLetter, DeadLetterSink, InboundMessage, MessageSource, StreamError};
use crate::models::Order;
use crate::storage::{InsertOutcome, OrderRepository, StoreError};

/// Shared, ordered record of what the fakes saw.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn message(offset: i64, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: "orders".to_string(),
        partition: 0,
        offset,
        key: Some(b"k1".to_vec()),
        payload: payload.to_vec(),
        timestamp: None,
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    inserted: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, u32>>,
    rejected: Mutex<HashSet<String>>,
    journal: Option<Journal>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// Make the next `times` inserts of `order_uid` fail.
    pub(crate) fn fail_inserts_for(&self, order_uid: &str, times: u32) {
        self.failures.lock().unwrap().insert(order_uid.to_string(), times);
    }

    /// Make every insert of `order_uid` fail as bad data.
    pub(crate) fn reject_inserts_for(&self, order_uid: &str) {
        self.rejected.lock().unwrap().insert(order_uid.to_string());
    }

    pub(crate) fn seed(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.order_uid.clone(), order);
    }

    /// Uids in the order they were first stored.
    pub(crate) fn inserted(&self) -> Vec<String> {
        self.inserted.lock().unwrap().clone()
    }

    fn note(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(entry);
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let uid = order.order_uid.clone();

        if self.rejected.lock().unwrap().contains(&uid) {
            self.note(format!("reject:{uid}"));
            return Err(StoreError::Rejected(sqlx::Error::Protocol("invalid byte sequence".to_string())));
        }

        let should_fail = match self.failures.lock().unwrap().get_mut(&uid) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if should_fail {
            self.note(format!("fail:{uid}"));
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut orders = self.orders.lock().unwrap();
        if orders.contains_key(&uid) {
            drop(orders);
            self.note(format!("duplicate:{uid}"));
            return Ok(InsertOutcome::Duplicate);
        }
        orders.insert(uid.clone(), order.clone());
        drop(orders);

        self.inserted.lock().unwrap().push(uid.clone());
        self.note(format!("insert:{uid}"));
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.orders
            .lock()
            .unwrap()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.orders.lock().unwrap().values().cloned().collect();
        // Newest first, undated last.
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    letters: Mutex<Vec<DeadLetter>>,
    fail: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingSink {
    async fn send(&self, letter: DeadLetter) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("dead-letter topic unavailable");
        }
        self.letters.lock().unwrap().push(letter);
        Ok(())
    }
}

/// Replays a fixed script of fetch results, then requests shutdown.
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Result<InboundMessage, StreamError>>>,
    committed: Mutex<Vec<i64>>,
    failing_commits: Mutex<HashSet<i64>>,
    journal: Journal,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ScriptedSource {
    pub(crate) fn new(
        script: Vec<Result<InboundMessage, StreamError>>,
        journal: Journal,
    ) -> (Self, Arc<watch::Sender<bool>>) {
        let (shutdown, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let source = Self {
            script: Mutex::new(script.into()),
            committed: Mutex::new(Vec::new()),
            failing_commits: Mutex::new(HashSet::new()),
            journal,
            shutdown: shutdown.clone(),
        };
        (source, shutdown)
    }

    pub(crate) fn fail_commit_at(&self, offset: i64) {
        self.failing_commits.lock().unwrap().insert(offset);
    }

    /// Offsets committed so far.
    pub(crate) fn committed(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch(&self) -> Result<InboundMessage, StreamError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(message)) => {
                self.journal.lock().unwrap().push(format!("fetch:{}", message.offset));
                Ok(message)
            }
            Some(Err(e)) => Err(e),
            None => {
                let _ = self.shutdown.send(true);
                std::future::pending().await
            }
        }
    }

    async fn commit(&self, message: &InboundMessage) -> Result<(), StreamError> {
        if self.failing_commits.lock().unwrap().remove(&message.offset) {
            return Err(StreamError::Kafka(rdkafka::error::KafkaError::NoMessageReceived));
        }
        self.committed.lock().unwrap().push(message.offset);
        self.journal.lock().unwrap().push(format!("commit:{}", message.offset));
        Ok(())
    }
}
