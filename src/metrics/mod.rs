//! Prometheus instrumentation for the answer and session pipelines.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;

/// Process-wide metrics handle.
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Counters and histograms, grouped by pipeline stage.
pub struct Metrics {
    registry: Registry,

    // Answer pipeline metrics
    pub generations: CounterVec,
    pub generation_duration: Histogram,
    pub generated_tokens: Histogram,
    pub low_budget_generations: Counter,
    pub chunks_planned: Histogram,
    pub chunk_failures: Counter,

    // Compression metrics
    pub compression_runs: CounterVec,
    pub compression_slices: CounterVec,

    // Extraction metrics
    pub extraction_requests: CounterVec,

    // Session pipeline metrics
    pub sessions_processed: CounterVec,
    pub artifacts_published: Counter,
}

impl Metrics {
    /// Register every metric against a fresh registry.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let generations = register_counter_vec_with_registry!(
            Opts::new("generations_total", "Total generation calls"),
            &["mode", "status"],
            registry
        )?;

        let generation_duration = register_histogram_with_registry!(
            "generation_duration_seconds",
            "Wall time of one generation call",
            registry
        )?;

        let generated_tokens = register_histogram_with_registry!(
            "generated_tokens",
            "New tokens produced per generation call",
            registry
        )?;

        let low_budget_generations = register_counter_with_registry!(
            Opts::new(
                "low_budget_generations_total",
                "Generation calls whose output cap fell below the answer floor"
            ),
            registry
        )?;

        let chunks_planned = register_histogram_with_registry!(
            "chunks_planned",
            "Chunks per chunked answer run",
            registry
        )?;

        let chunk_failures = register_counter_with_registry!(
            Opts::new("chunk_failures_total", "Chunks that produced no partial answer"),
            registry
        )?;

        let compression_runs = register_counter_vec_with_registry!(
            Opts::new("compression_runs_total", "Context compression attempts"),
            &["outcome"],
            registry
        )?;

        let compression_slices = register_counter_vec_with_registry!(
            Opts::new("compression_slices_total", "Summarized slices"),
            &["status"],
            registry
        )?;

        let extraction_requests = register_counter_vec_with_registry!(
            Opts::new("extraction_requests_total", "File extraction attempts"),
            &["kind", "status"],
            registry
        )?;

        let sessions_processed = register_counter_vec_with_registry!(
            Opts::new("sessions_processed_total", "Study sessions processed"),
            &["status"],
            registry
        )?;

        let artifacts_published = register_counter_with_registry!(
            Opts::new("artifacts_published_total", "Generated artifacts stored"),
            registry
        )?;

        Ok(Self {
            registry,
            generations,
            generation_duration,
            generated_tokens,
            low_budget_generations,
            chunks_planned,
            chunk_failures,
            compression_runs,
            compression_slices,
            extraction_requests,
            sessions_processed,
            artifacts_published,
        })
    }

    /// Registry backing these metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one generation call
    pub fn record_generation(&self, mode: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.generations.with_label_values(&[mode, status]).inc();
    }

    /// Record a compression run outcome ("skipped" or "compressed")
    pub fn record_compression(&self, outcome: &str) {
        self.compression_runs.with_label_values(&[outcome]).inc();
    }

    /// Record one summarized slice
    pub fn record_compression_slice(&self, status: &str) {
        self.compression_slices.with_label_values(&[status]).inc();
    }

    /// Record a file extraction attempt
    pub fn record_extraction(&self, kind: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.extraction_requests
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Record a processed session
    pub fn record_session(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.sessions_processed.with_label_values(&[status]).inc();
    }

    /// Encode everything gathered so far as Prometheus text.
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_succeeds() {
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_generation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_generation("single", true);
        metrics.record_generation("chunk", false);
        metrics.low_budget_generations.inc();
    }

    #[test]
    fn test_export_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_compression("skipped");
        let exported = metrics.export_prometheus();
        assert!(exported.contains("compression_runs_total"));
    }
}
