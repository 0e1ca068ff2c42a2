// ============================================================================
// Messaging
// ============================================================================
//
// Broker plumbing, kept apart from the ingestion policy:
// - consumer    - `MessageSource` and its Kafka implementation
// - dead_letter - `DeadLetterSink` and its Kafka implementation
// - redpanda    - shared producer client
//
// ============================================================================

pub mod consumer;
pub mod dead_letter;
pub mod redpanda;

pub use consumer::{ConsumerSettings, InboundMessage, KafkaOrderSource, MessageSource, StreamError};
pub use dead_letter::{DeadLetter, DeadLetterSink, KafkaDeadLetterSink};
pub use redpanda::{Outbound, RedpandaClient};
