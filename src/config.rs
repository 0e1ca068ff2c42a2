use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::messaging::ConsumerSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub kafka: ConsumerSettings,
    /// `None` disables dead-letter routing.
    pub dead_letter_topic: Option<String>,
    pub dead_letter_timeout: Duration,
    pub http_addr: String,
    pub cache_warmup_limit: i64,
    pub fetch_backoff: Duration,
    pub retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; unset or blank keys fall back to
    /// defaults. `KAFKA_DLQ_TOPIC` is the exception: blank disables it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var = |key: &str, default: &str| set(key).unwrap_or_else(|| default.to_string());

        let database_url = match set("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                var("PG_USER", "wb"),
                var("PG_PASSWORD", "wb"),
                var("PG_HOST", "localhost"),
                parse::<u16>(&var("PG_PORT", "5432"), "PG_PORT")?,
                var("PG_DB", "wb_orders"),
            ),
        };

        let dead_letter_topic = Some(lookup("KAFKA_DLQ_TOPIC").unwrap_or_else(|| "orders_dlq".to_string()))
            .map(|topic| topic.trim().to_string())
            .filter(|topic| !topic.is_empty());

        Ok(Config {
            database_url,
            database_max_connections: parse(&var("PG_MAX_CONNECTIONS", "10"), "PG_MAX_CONNECTIONS")?,
            kafka: ConsumerSettings {
                brokers: var("KAFKA_BROKER", "localhost:9092"),
                topic: var("KAFKA_TOPIC", "orders"),
                group_id: var("KAFKA_GROUP", "orders-consumer"),
            },
            dead_letter_topic,
            dead_letter_timeout: Duration::from_millis(parse(&var("DLQ_TIMEOUT_MS", "2000"), "DLQ_TIMEOUT_MS")?),
            http_addr: var("HTTP_ADDR", "0.0.0.0:8080"),
            cache_warmup_limit: parse(&var("CACHE_WARMUP_LIMIT", "50"), "CACHE_WARMUP_LIMIT")?,
            fetch_backoff: Duration::from_millis(parse(&var("FETCH_BACKOFF_MS", "2000"), "FETCH_BACKOFF_MS")?),
            retry_backoff: Duration::from_millis(parse(&var("RETRY_BACKOFF_MS", "500"), "RETRY_BACKOFF_MS")?),
        })
    }
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a number, got {raw:?}"))
}
