use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics - Prometheus metrics for the ingestion service
// ============================================================================
//
// - Message outcomes and handling latency
// - Deferrals (messages held back for retry) by reason
// - Dead-letter writes and failed dead-letter writes
// - Fetch errors and offset commit failures
// - Read path: cache hits, store fallbacks, misses
//
// All metrics are registered with one registry and scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub messages_total: IntCounterVec,
    pub message_duration: HistogramVec,
    pub deferrals_total: IntCounterVec,

    pub dead_letters_total: IntCounterVec,
    pub dead_letter_failures_total: IntCounter,

    pub fetch_errors_total: IntCounter,
    pub commit_failures_total: IntCounter,

    pub lookups_total: IntCounterVec,
    pub cache_entries: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_total = IntCounterVec::new(
            Opts::new("ingest_messages_total", "Messages that reached a terminal outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let message_duration = HistogramVec::new(
            HistogramOpts::new("ingest_message_duration_seconds", "Time spent handling one message attempt")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(message_duration.clone()))?;

        let deferrals_total = IntCounterVec::new(
            Opts::new("ingest_deferrals_total", "Message attempts deferred for retry"),
            &["reason"],
        )?;
        registry.register(Box::new(deferrals_total.clone()))?;

        let dead_letters_total = IntCounterVec::new(
            Opts::new("ingest_dead_letters_total", "Payloads written to the dead-letter topic"),
            &["reason"],
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let dead_letter_failures_total = IntCounter::new(
            "ingest_dead_letter_failures_total",
            "Dead-letter writes that failed and were dropped",
        )?;
        registry.register(Box::new(dead_letter_failures_total.clone()))?;

        let fetch_errors_total = IntCounter::new(
            "ingest_fetch_errors_total",
            "Errors while fetching from the stream",
        )?;
        registry.register(Box::new(fetch_errors_total.clone()))?;

        let commit_failures_total = IntCounter::new(
            "ingest_commit_failures_total",
            "Offset commits that failed",
        )?;
        registry.register(Box::new(commit_failures_total.clone()))?;

        let lookups_total = IntCounterVec::new(
            Opts::new("order_lookups_total", "Order lookups by where they were answered"),
            &["result"],
        )?;
        registry.register(Box::new(lookups_total.clone()))?;

        let cache_entries = IntGauge::new("order_cache_entries", "Orders held in the cache")?;
        registry.register(Box::new(cache_entries.clone()))?;

        Ok(Self {
            registry,
            messages_total,
            message_duration,
            deferrals_total,
            dead_letters_total,
            dead_letter_failures_total,
            fetch_errors_total,
            commit_failures_total,
            lookups_total,
            cache_entries,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_message(&self, outcome: &str, duration_secs: f64) {
        self.messages_total.with_label_values(&[outcome]).inc();
        self.message_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_deferral(&self, reason: &str, duration_secs: f64) {
        self.deferrals_total.with_label_values(&[reason]).inc();
        self.message_duration.with_label_values(&["deferred"]).observe(duration_secs);
    }

    pub fn record_dead_letter(&self, reason: &str, delivered: bool) {
        if delivered {
            self.dead_letters_total.with_label_values(&[reason]).inc();
        } else {
            self.dead_letter_failures_total.inc();
        }
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors_total.inc();
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures_total.inc();
    }

    pub fn record_lookup(&self, result: &str) {
        self.lookups_total.with_label_values(&[result]).inc();
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }
}
