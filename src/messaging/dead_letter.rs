use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::redpanda::{Outbound, RedpandaClient};

// ============================================================================
// Dead-Letter Sink
// ============================================================================
//
// Side channel for payloads the pipeline gave up on. The raw bytes and key
// are forwarded untouched so the record can be inspected or replayed as-is.
// Writes are best-effort: callers log failures and move on.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Why the record was rejected.
    pub reason: String,
    /// Where it came from, as `topic/partition/offset`.
    pub origin: String,
    /// Broker timestamp of the rejected record, epoch millis.
    pub source_timestamp: Option<i64>,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> anyhow::Result<()>;
}

pub struct KafkaDeadLetterSink {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl KafkaDeadLetterSink {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn send(&self, letter: DeadLetter) -> anyhow::Result<()> {
        let mut headers = vec![
            ("dlq-reason", letter.reason.clone()),
            ("dlq-origin", letter.origin.clone()),
        ];
        if let Some(ts) = letter.source_timestamp {
            headers.push(("dlq-source-timestamp", ts.to_string()));
        }

        self.client
            .publish(Outbound {
                topic: &self.topic,
                key: letter.key.as_deref(),
                payload: &letter.payload,
                headers,
                timestamp: letter.timestamp.map(|ts| ts.timestamp_millis()),
            })
            .await?;

        tracing::info!(
            topic = %self.topic,
            origin = %letter.origin,
            "💀 Payload routed to dead-letter topic"
        );
        Ok(())
    }
}
