//! Prometheus metrics for conversion runs.
//!
//! Collectors are process-wide statics; the binary registers them through
//! [`all_metrics`] in its own registry.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

/// New entries recorded in the index.
pub static ENTRIES_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "rekonv_entries_discovered_total",
        "Total entries recorded in the conversion index",
    )
    .unwrap()
});

/// Entries handled by the driver, by result.
pub static ENTRIES_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "rekonv_entries_processed_total",
            "Total entries processed by the driver",
        ),
        &["result"], // "converted", "copied", "skipped", "failed"
    )
    .unwrap()
});

/// Wall time of each transcoder invocation.
pub static TRANSCODE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "rekonv_transcode_duration_seconds",
            "Duration of a single transcoder invocation",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ENTRIES_DISCOVERED.clone()),
        Box::new(ENTRIES_PROCESSED.clone()),
        Box::new(TRANSCODE_DURATION.clone()),
    ]
}
