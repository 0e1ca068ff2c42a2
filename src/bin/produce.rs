//! Publish one JSON order file to the orders topic.
//!
//! Usage: `produce [path]` (defaults to `demos/order.json`). Broker and topic
//! come from the same environment as the service.

use anyhow::Context;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_pipeline::config::Config;
use order_pipeline::messaging::{Outbound, RedpandaClient};
use order_pipeline::models::Order;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let path = std::env::args().nth(1).unwrap_or_else(|| "demos/order.json".to_string());
    let payload = std::fs::read(&path).with_context(|| format!("reading {path}"))?;

    // Key by order_uid when the file parses; broken payloads are sent as-is
    // so the dead-letter path can be exercised too.
    let key = match Order::from_slice(&payload) {
        Ok(order) if !order.order_uid.trim().is_empty() => order.order_uid,
        Ok(_) | Err(_) => {
            tracing::warn!(path = %path, "Payload has no usable order_uid, sending unkeyed");
            String::new()
        }
    };

    let client = RedpandaClient::new(&config.kafka.brokers, Duration::from_secs(5))?;
    client
        .publish(Outbound {
            topic: &config.kafka.topic,
            key: (!key.is_empty()).then_some(key.as_bytes()),
            payload: &payload,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            ..Default::default()
        })
        .await?;

    tracing::info!(topic = %config.kafka.topic, order_uid = %key, bytes = payload.len(), "✅ Order published");
    Ok(())
}
