//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Relay
    pub relay_requests_total: IntCounter,
    pub relay_rejections_total: IntCounterVec,
    pub relay_cosigned_total: IntCounter,
    pub relay_submissions_total: IntCounterVec,
    pub submission_retries_total: IntCounter,

    // Assembly
    pub estimation_fallbacks_total: IntCounterVec,
    pub task_slot_conflicts_total: IntCounter,

    // Histograms
    pub relay_latency: Histogram,
    pub assembly_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let relay_requests_total = IntCounter::with_opts(Opts::new(
            "relay_requests_total",
            "Envelopes received by the permissioned relay",
        ))?;

        let relay_rejections_total = IntCounterVec::new(
            Opts::new(
                "relay_rejections_total",
                "Envelopes rejected before co-signing, by reason",
            ),
            &["reason"],
        )?;

        let relay_cosigned_total = IntCounter::with_opts(Opts::new(
            "relay_cosigned_total",
            "Envelopes that received the privileged signature",
        ))?;

        let relay_submissions_total = IntCounterVec::new(
            Opts::new(
                "relay_submissions_total",
                "Submission outcomes of co-signed envelopes",
            ),
            &["outcome"],
        )?;

        let submission_retries_total = IntCounter::with_opts(Opts::new(
            "submission_retries_total",
            "Submission attempts beyond the first",
        ))?;

        let estimation_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "estimation_fallbacks_total",
                "Resource estimates that used configured defaults",
            ),
            &["estimate"],
        )?;

        let task_slot_conflicts_total = IntCounter::with_opts(Opts::new(
            "task_slot_conflicts_total",
            "Task slot claims rejected by the ledger as already taken",
        ))?;

        let relay_latency = Histogram::with_opts(
            HistogramOpts::new("relay_latency_seconds", "End-to-end relay request latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 15.0, 30.0]),
        )?;

        let assembly_latency = Histogram::with_opts(
            HistogramOpts::new("assembly_latency_seconds", "Transaction assembly latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;

        registry.register(Box::new(relay_requests_total.clone()))?;
        registry.register(Box::new(relay_rejections_total.clone()))?;
        registry.register(Box::new(relay_cosigned_total.clone()))?;
        registry.register(Box::new(relay_submissions_total.clone()))?;
        registry.register(Box::new(submission_retries_total.clone()))?;
        registry.register(Box::new(estimation_fallbacks_total.clone()))?;
        registry.register(Box::new(task_slot_conflicts_total.clone()))?;
        registry.register(Box::new(relay_latency.clone()))?;
        registry.register(Box::new(assembly_latency.clone()))?;

        Ok(Self {
            registry,
            relay_requests_total,
            relay_rejections_total,
            relay_cosigned_total,
            relay_submissions_total,
            submission_retries_total,
            estimation_fallbacks_total,
            task_slot_conflicts_total,
            relay_latency,
            assembly_latency,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.relay_requests_total.inc();
        metrics
            .relay_rejections_total
            .with_label_values(&["disallowed_instruction"])
            .inc();
        assert_eq!(metrics.relay_requests_total.get(), 1);
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics
            .estimation_fallbacks_total
            .with_label_values(&["priority_fee"])
            .inc();
        let text = metrics.render().unwrap();
        assert!(text.contains("estimation_fallbacks_total"));
        assert!(text.contains("relay_requests_total"));
    }

    #[test]
    fn test_timer_records() {
        let metrics = Metrics::new().unwrap();
        let timer = Timer::start();
        timer.observe_duration(&metrics.assembly_latency);
        assert_eq!(metrics.assembly_latency.get_sample_count(), 1);
        assert!(timer.elapsed_secs() >= 0.0);
    }
}
