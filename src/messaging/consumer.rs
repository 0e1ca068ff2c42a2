use async_trait::async_trait;
use std::sync::Arc;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    Message, Offset, TopicPartitionList,
};

// ============================================================================
// Stream Source
// ============================================================================
//
// The pipeline sees the broker through `MessageSource`: fetch one message,
// later commit it. Offsets are never committed behind the pipeline's back
// (`enable.auto.commit=false`). Commits are synchronous so a rejection by the
// group coordinator comes back as an error instead of vanishing in a callback.
//
// ============================================================================

/// A fetched message, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Broker timestamp in epoch millis, when present.
    pub timestamp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("commit task failed: {0}")]
    CommitTask(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message.
    async fn fetch(&self) -> Result<InboundMessage, StreamError>;

    /// Record `message` as processed for its partition.
    async fn commit(&self, message: &InboundMessage) -> Result<(), StreamError>;
}

/// Connection settings for the order topic.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

pub struct KafkaOrderSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaOrderSource {
    pub fn new(settings: &ConsumerSettings) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .set("fetch.wait.max.ms", "2000")
            .create()?;

        consumer.subscribe(&[settings.topic.as_str()])?;

        tracing::info!(
            brokers = %settings.brokers,
            topic = %settings.topic,
            group = %settings.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

/// Offsets to commit once `message` is done: the next one to read.
fn commit_position(message: &InboundMessage) -> Result<TopicPartitionList, StreamError> {
    let mut offsets = TopicPartitionList::new();
    offsets.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))?;
    Ok(offsets)
}

#[async_trait]
impl MessageSource for KafkaOrderSource {
    async fn fetch(&self) -> Result<InboundMessage, StreamError> {
        let message = self.consumer.recv().await?;

        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            // Tombstones carry no payload; they decode as malformed.
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp: message.timestamp().to_millis(),
        })
    }

    async fn commit(&self, message: &InboundMessage) -> Result<(), StreamError> {
        let offsets = commit_position(message)?;
        // A sync commit blocks until the coordinator answers.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync)).await??;
        Ok(())
    }
}
