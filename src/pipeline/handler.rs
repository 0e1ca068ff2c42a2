use chrono::Utc;
use std::sync::Arc;

use super::IngestError;
use crate::cache::OrderCache;
use crate::messaging::{DeadLetter, DeadLetterSink, InboundMessage};
use crate::metrics::Metrics;
use crate::models::Order;
use crate::storage::{InsertOutcome, OrderRepository, StoreError};

/// What the loop should do with a message after one handling attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Stored (or already stored) and cached. Commit.
    Processed { order_uid: String, duplicate: bool },
    /// Not safe to commit. Back off and hand the same message in again.
    Deferred(IngestError),
    /// Will never be stored. Commit so the partition keeps moving.
    Discarded { reason: IngestError, dead_lettered: bool },
}

impl Outcome {
    pub fn should_commit(&self) -> bool {
        !matches!(self, Outcome::Deferred(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Processed { duplicate: false, .. } => "processed",
            Outcome::Processed { duplicate: true, .. } => "duplicate",
            Outcome::Deferred(_) => "deferred",
            Outcome::Discarded { .. } => "discarded",
        }
    }
}

/// Business policy for one message: decode, validate, persist, cache.
/// Knows nothing about offsets; the caller turns the `Outcome` into a commit
/// or a retry.
pub struct OrderHandler {
    store: Arc<dyn OrderRepository>,
    cache: Arc<OrderCache>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    metrics: Arc<Metrics>,
}

impl OrderHandler {
    pub fn new(
        store: Arc<dyn OrderRepository>,
        cache: Arc<OrderCache>,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            dead_letters,
            metrics,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> Outcome {
        let order = match Order::from_slice(&message.payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Payload is not a valid order document"
                );
                return match self.dead_letter(message, "malformed", &e).await {
                    Some(dead_lettered) => Outcome::Discarded {
                        reason: IngestError::MalformedPayload(e),
                        dead_lettered,
                    },
                    // Nowhere to park it: keep it on the partition.
                    None => Outcome::Deferred(IngestError::MalformedPayload(e)),
                };
            }
        };

        if let Err(e) = order.validate() {
            tracing::warn!(
                partition = message.partition,
                offset = message.offset,
                order_uid = %order.order_uid,
                error = %e,
                "Order failed validation"
            );
            let dead_lettered = self.dead_letter(message, "invalid", &e).await.unwrap_or(false);
            return Outcome::Discarded {
                reason: IngestError::InvalidOrder(e),
                dead_lettered,
            };
        }

        match self.store.insert(&order).await {
            Ok(InsertOutcome::Inserted) => {
                let order_uid = order.order_uid.clone();
                self.cache.set(order);
                self.metrics.set_cache_entries(self.cache.len());

                tracing::info!(
                    order_uid = %order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    "✅ Stored order"
                );
                Outcome::Processed { order_uid, duplicate: false }
            }
            Ok(InsertOutcome::Duplicate) => {
                // Cache what the store holds, not the redelivered copy.
                match self.store.get(&order.order_uid).await {
                    Ok(stored) => {
                        self.cache.set(stored);
                        self.metrics.set_cache_entries(self.cache.len());
                    }
                    Err(e) => tracing::warn!(
                        order_uid = %order.order_uid,
                        error = %e,
                        "Could not reload duplicate order into cache"
                    ),
                }

                tracing::info!(
                    order_uid = %order.order_uid,
                    offset = message.offset,
                    "Order already stored, redelivery ignored"
                );
                Outcome::Processed {
                    order_uid: order.order_uid,
                    duplicate: true,
                }
            }
            Err(e @ StoreError::Rejected(_)) => {
                tracing::error!(
                    order_uid = %order.order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Database rejected order data"
                );
                let dead_lettered = self.dead_letter(message, "rejected", &e).await.unwrap_or(false);
                Outcome::Discarded {
                    reason: IngestError::RejectedByStore(e),
                    dead_lettered,
                }
            }
            Err(e) => {
                tracing::error!(
                    order_uid = %order.order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to persist order, offset withheld"
                );
                Outcome::Deferred(IngestError::TransientStore(e))
            }
        }
    }

    /// `None` when no sink is configured, otherwise whether the write landed.
    async fn dead_letter(
        &self,
        message: &InboundMessage,
        reason: &str,
        error: &(dyn std::fmt::Display + Sync),
    ) -> Option<bool> {
        let sink = self.dead_letters.as_ref()?;

        let letter = DeadLetter {
            key: message.key.clone(),
            payload: message.payload.clone(),
            timestamp: Some(Utc::now()),
            reason: format!("{reason}: {error}"),
            origin: format!("{}/{}/{}", message.topic, message.partition, message.offset),
            source_timestamp: message.timestamp,
        };

        let delivered = match sink.send(letter).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    offset = message.offset,
                    error = %e,
                    "Dead-letter write failed, dropping payload"
                );
                false
            }
        };
        self.metrics.record_dead_letter(reason, delivered);
        Some(delivered)
    }
}
