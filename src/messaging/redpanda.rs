use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use anyhow::Result;
use std::time::Duration;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

/// A record to publish. `key` and `timestamp` (epoch millis) are optional.
#[derive(Debug, Clone, Default)]
pub struct Outbound<'a> {
    pub topic: &'a str,
    pub key: Option<&'a [u8]>,
    pub payload: &'a [u8],
    pub headers: Vec<(&'a str, String)>,
    pub timestamp: Option<i64>,
}

/// Producer side of the broker connection, behind a circuit breaker.
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(cb_config),
            send_timeout,
        })
    }

    pub async fn publish(&self, record: Outbound<'_>) -> Result<()> {
        let topic = record.topic;

        let result = self.circuit_breaker.call(async {
            let mut future_record = FutureRecord::<[u8], [u8]>::to(topic).payload(record.payload);
            if let Some(key) = record.key {
                future_record = future_record.key(key);
            }
            if let Some(timestamp) = record.timestamp {
                future_record = future_record.timestamp(timestamp);
            }
            if !record.headers.is_empty() {
                let headers = record.headers.iter().fold(OwnedHeaders::new(), |headers, (key, value)| {
                    headers.insert(Header { key: *key, value: Some(value.as_str()) })
                });
                future_record = future_record.headers(headers);
            }

            self.producer
                .send(future_record, Timeout::After(self.send_timeout))
                .await
                .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

            Ok::<(), anyhow::Error>(())
        }).await;

        match result {
            Ok(_) => {
                tracing::debug!(topic = %topic, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(topic = %topic, "Circuit breaker open - Redpanda unavailable");
                Err(anyhow::anyhow!("Circuit breaker open for Redpanda"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }
}
