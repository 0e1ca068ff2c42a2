use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_pipeline::cache::OrderCache;
use order_pipeline::config::Config;
use order_pipeline::http::{self, AppState};
use order_pipeline::messaging::{DeadLetterSink, KafkaDeadLetterSink, KafkaOrderSource, RedpandaClient};
use order_pipeline::metrics::Metrics;
use order_pipeline::pipeline::{IngestionPipeline, OrderHandler, PipelinePolicy};
use order_pipeline::reader::OrderReader;
use order_pipeline::storage::{OrderRepository, PgOrderStore};
use order_pipeline::utils::{retry_with_backoff, Backoff};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_pipeline=debug"))
        )
        .init();

    tracing::info!("🚀 Starting order ingestion service");

    let config = Config::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Postgres ===
    tracing::info!("Connecting to Postgres...");
    let store = retry_with_backoff(
        5,
        &Backoff::exponential(Duration::from_secs(1), Duration::from_secs(10)),
        |_| PgOrderStore::connect(&config.database_url, config.database_max_connections),
    )
    .await?;
    store.ensure_schema().await?;
    let store: Arc<dyn OrderRepository> = Arc::new(store);

    // === 3. Cache, warmed with the newest orders ===
    let cache = Arc::new(OrderCache::new());
    let reader = OrderReader::new(cache.clone(), store.clone(), metrics.clone());
    match reader.warm_up(config.cache_warmup_limit).await {
        Ok(loaded) => tracing::info!(loaded = loaded, "Cache warmed up"),
        Err(e) => tracing::warn!(error = %e, "Cache warm-up failed, starting cold"),
    }

    // === 4. HTTP API on its own actix system ===
    let state = Arc::new(AppState {
        reader,
        metrics: metrics.clone(),
    });
    let http_addr = config.http_addr.clone();
    let (handle_tx, handle_rx) = oneshot::channel();
    let http_thread = std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            let server = match http::build_server(state, &http_addr) {
                Ok(server) => server,
                Err(e) => {
                    tracing::error!("HTTP server error: {}", e);
                    return;
                }
            };
            let _ = handle_tx.send(server.handle());
            if let Err(e) = server.await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });
    let server_handle = handle_rx
        .await
        .map_err(|_| anyhow::anyhow!("HTTP server failed to start on {}", config.http_addr))?;

    // === 5. Dead-letter producer ===
    let dead_letters: Option<Arc<dyn DeadLetterSink>> = match &config.dead_letter_topic {
        Some(topic) => {
            let client = Arc::new(RedpandaClient::new(&config.kafka.brokers, config.dead_letter_timeout)?);
            let sink = KafkaDeadLetterSink::new(client, topic.clone());
            tracing::info!(topic = %sink.topic(), "Dead-letter routing enabled");
            Some(Arc::new(sink))
        }
        None => {
            tracing::warn!("Dead-letter routing disabled, malformed messages will block their partition");
            None
        }
    };

    // === 6. Ingestion pipeline ===
    let source = KafkaOrderSource::new(&config.kafka)?;
    let handler = OrderHandler::new(store, cache, dead_letters, metrics.clone());
    let policy = PipelinePolicy {
        fetch_backoff: Backoff::fixed(config.fetch_backoff),
        retry_backoff: Backoff::fixed(config.retry_backoff),
    };
    let pipeline = IngestionPipeline::new(source, handler, policy, metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(async move { pipeline.run(shutdown_rx).await });

    // === 7. Run until signalled ===
    shutdown_signal().await;
    tracing::info!("🛑 Shutdown requested");

    let _ = shutdown_tx.send(true);
    match consumer.await {
        Ok(summary) => tracing::info!(?summary, "Consumer drained"),
        Err(e) => tracing::error!("Consumer task failed: {}", e),
    }

    server_handle.stop(true).await;
    if !matches!(tokio::task::spawn_blocking(move || http_thread.join()).await, Ok(Ok(()))) {
        tracing::error!("HTTP thread did not shut down cleanly");
    }

    tracing::info!("👋 Bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
