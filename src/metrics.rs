//! Prometheus metrics for the suggester

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec, CounterVec,
    Gauge, Histogram, HistogramVec,
};

/// Suggester metrics collection
pub struct SuggesterMetrics {
    /// Number of corpus builds by outcome (installed, reused, failed, cancelled)
    pub builds_total: CounterVec,

    /// Corpus build duration in seconds
    pub build_duration: HistogramVec,

    /// Number of searches by outcome (complete, partial)
    pub searches_total: CounterVec,

    /// Search duration in seconds
    pub search_duration: Histogram,

    /// Number of corpora with an installed index
    pub ready_corpora: Gauge,
}

impl SuggesterMetrics {
    pub fn new() -> Self {
        Self {
            builds_total: register_counter_vec!(
                "suggester_builds_total",
                "Total number of corpus suggestion builds",
                &["outcome"]
            )
            .unwrap(),

            build_duration: register_histogram_vec!(
                "suggester_build_duration_seconds",
                "Corpus suggestion build duration in seconds",
                &["outcome"],
                vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
            )
            .unwrap(),

            searches_total: register_counter_vec!(
                "suggester_searches_total",
                "Total number of suggestion searches",
                &["outcome"]
            )
            .unwrap(),

            search_duration: register_histogram!(
                "suggester_search_duration_seconds",
                "Suggestion search duration in seconds",
                vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )
            .unwrap(),

            ready_corpora: register_gauge!(
                "suggester_ready_corpora",
                "Number of corpora with an installed suggestion index"
            )
            .unwrap(),
        }
    }

    /// Record a finished build
    pub fn record_build(&self, outcome: &str, duration_secs: f64) {
        self.builds_total.with_label_values(&[outcome]).inc();
        self.build_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    /// Record a finished search
    pub fn record_search(&self, partial: bool, duration_secs: f64) {
        let outcome = if partial { "partial" } else { "complete" };
        self.searches_total.with_label_values(&[outcome]).inc();
        self.search_duration.observe(duration_secs);
    }
}

impl Default for SuggesterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Global suggester metrics instance
    pub static ref SUGGESTER_METRICS: SuggesterMetrics = SuggesterMetrics::new();
}

/// Initialize suggester metrics (idempotent)
pub fn init_suggester_metrics() {
    lazy_static::initialize(&SUGGESTER_METRICS);
}
