//! Prometheus metrics recording and background collection.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tunesim_core::Engine;

/// Records HTTP request metrics.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records an ingest-side operation (`ingest`, `reingest`, `delete`) and its outcome.
pub fn record_ingest(operation: &'static str, outcome: &'static str) {
    counter!(
        "tunesim_ingest_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Records a similarity query (`by_id` or `by_vector`) and its latency.
pub fn record_query(target: &'static str, duration: Duration) {
    counter!("tunesim_query_total", "target" => target).increment(1);
    histogram!("tunesim_query_duration_seconds", "target" => target)
        .record(duration.as_secs_f64());
}

/// Updates engine-level Prometheus gauges.
pub fn update_engine_metrics(engine: &Engine) {
    let stats = engine.stats();
    gauge!("tunesim_records_total").set(stats.records as f64);
    gauge!("tunesim_indexed_total").set(stats.indexed as f64);
    gauge!("tunesim_tombstones_total").set(stats.tombstones as f64);
    gauge!("tunesim_pending_ingests").set(stats.pending as f64);
    gauge!("tunesim_wal_size_bytes").set(stats.wal_bytes as f64);
}
