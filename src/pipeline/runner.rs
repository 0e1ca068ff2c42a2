use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::handler::{OrderHandler, Outcome};
use super::IngestError;
use crate::messaging::{InboundMessage, MessageSource};
use crate::metrics::Metrics;
use crate::utils::Backoff;

/// Delays applied by the loop. Both default to fixed delays.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    /// After a failed fetch.
    pub fetch_backoff: Backoff,
    /// After a deferred message, before handling it again.
    pub retry_backoff: Backoff,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            fetch_backoff: Backoff::fixed(Duration::from_secs(2)),
            retry_backoff: Backoff::fixed(Duration::from_millis(500)),
        }
    }
}

/// Counters for one `run`, returned when the loop stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub processed: u64,
    pub discarded: u64,
    pub deferrals: u64,
    pub fetch_errors: u64,
    pub commit_failures: u64,
}

pub struct IngestionPipeline<S> {
    source: S,
    handler: OrderHandler,
    policy: PipelinePolicy,
    metrics: Arc<Metrics>,
}

impl<S: MessageSource> IngestionPipeline<S> {
    pub fn new(source: S, handler: OrderHandler, policy: PipelinePolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            source,
            handler,
            policy,
            metrics,
        }
    }

    /// Consume until `shutdown` flips to `true` (or its sender is dropped).
    /// One message is in flight at a time; the next fetch starts only after
    /// the current message was committed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        tracing::info!("🚀 Ingestion pipeline started");

        let mut summary = RunSummary::default();
        let mut fetch_failures = 0u32;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                fetched = self.source.fetch() => fetched,
            };

            let message = match fetched {
                Ok(message) => {
                    fetch_failures = 0;
                    message
                }
                Err(e) => {
                    fetch_failures += 1;
                    summary.fetch_errors += 1;
                    self.metrics.record_fetch_error();

                    let error = IngestError::from(e);
                    let delay = self.policy.fetch_backoff.delay_for(fetch_failures);
                    tracing::warn!(
                        error = %error,
                        consecutive_failures = fetch_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, backing off"
                    );
                    if !pause(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if !self.settle(&message, &mut shutdown, &mut summary).await {
                break;
            }
        }

        tracing::info!(
            processed = summary.processed,
            discarded = summary.discarded,
            deferrals = summary.deferrals,
            fetch_errors = summary.fetch_errors,
            commit_failures = summary.commit_failures,
            "Ingestion pipeline stopped"
        );
        summary
    }

    /// Handle `message` until it reaches a terminal outcome and commit it.
    /// Returns `false` if cancelled while backing off; the offset is then
    /// left uncommitted.
    async fn settle(
        &self,
        message: &InboundMessage,
        shutdown: &mut watch::Receiver<bool>,
        summary: &mut RunSummary,
    ) -> bool {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = self.handler.handle(message).await;
            let elapsed = started.elapsed().as_secs_f64();

            match &outcome {
                Outcome::Deferred(reason) => {
                    summary.deferrals += 1;
                    self.metrics.record_deferral(reason.kind(), elapsed);

                    let delay = self.policy.retry_backoff.delay_for(attempt);
                    tracing::warn!(
                        partition = message.partition,
                        offset = message.offset,
                        attempt = attempt,
                        error = %reason,
                        delay_ms = delay.as_millis() as u64,
                        "Message deferred, retrying after backoff"
                    );
                    if !pause(delay, shutdown).await {
                        return false;
                    }
                }
                Outcome::Processed { .. } => summary.processed += 1,
                Outcome::Discarded { .. } => summary.discarded += 1,
            }

            if outcome.should_commit() {
                self.metrics.record_message(outcome.label(), elapsed);
                self.commit(message, summary).await;
                return true;
            }
        }
    }

    async fn commit(&self, message: &InboundMessage, summary: &mut RunSummary) {
        if let Err(e) = self.source.commit(message).await {
            // The next successful commit on this partition covers it.
            summary.commit_failures += 1;
            self.metrics.record_commit_failure();
            tracing::error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Offset commit failed"
            );
        }
    }
}

/// Resolves once shutdown is requested.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay` unless shutdown comes first. `false` means shutdown.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = cancelled(shutdown) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
