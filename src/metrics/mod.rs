//! Metrics module
//!
//! Provides Prometheus metrics for uploads, listings and sync runs.
//! Recording can be switched off at runtime with [`set_enabled`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

lazy_static! {
    // Upload metrics
    pub static ref UPLOAD_ATTEMPTS: CounterVec = register_counter_vec!(
        "clipvault_upload_attempts_total",
        "Upload attempts per strategy",
        &["strategy", "status"]
    ).unwrap();

    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "clipvault_uploads_total",
        "Total number of uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "clipvault_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "clipvault_upload_duration_seconds",
        "Upload duration in seconds per strategy",
        &["strategy"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]
    ).unwrap();

    // Listing metrics
    pub static ref LIST_REQUESTS: CounterVec = register_counter_vec!(
        "clipvault_list_requests_total",
        "ListObjectsV2 page requests",
        &["status"]
    ).unwrap();

    // Sync metrics
    pub static ref SYNC_RUNS: CounterVec = register_counter_vec!(
        "clipvault_sync_runs_total",
        "Reconciliation runs",
        &["strategy", "status"]
    ).unwrap();

    pub static ref SYNC_ITEMS: CounterVec = register_counter_vec!(
        "clipvault_sync_items_total",
        "Per-item reconciliation actions",
        &["action", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "clipvault_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Turn recording on or off
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether recording is on
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Record one strategy attempt
pub fn record_upload_attempt(strategy: &str, success: bool, duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    UPLOAD_ATTEMPTS
        .with_label_values(&[strategy, status_label(success)])
        .inc();
    UPLOAD_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    if !is_enabled() {
        return;
    }
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure() {
    if !is_enabled() {
        return;
    }
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record a listing page request
pub fn record_list_request(success: bool) {
    if !is_enabled() {
        return;
    }
    LIST_REQUESTS
        .with_label_values(&[status_label(success)])
        .inc();
}

/// Record a finished sync run
pub fn record_sync_run(strategy: &str, success: bool) {
    if !is_enabled() {
        return;
    }
    SYNC_RUNS
        .with_label_values(&[strategy, status_label(success)])
        .inc();
}

/// Record one reconciliation action
pub fn record_sync_item(action: &str, success: bool) {
    if !is_enabled() {
        return;
    }
    SYNC_ITEMS
        .with_label_values(&[action, status_label(success)])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    if !is_enabled() {
        return;
    }
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
