//! Prometheus metrics for fee-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fee_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for fee structures created, by creation mode.
pub static STRUCTURES_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_structures_created_total",
        "Total number of fee structures created",
        &["mode"]
    )
    .expect("Failed to register STRUCTURES_CREATED")
});

/// Counter for conflict checks, by outcome.
pub static CONFLICTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_structure_conflicts_total",
        "Total number of structure conflicts detected",
        &["outcome"]
    )
    .expect("Failed to register CONFLICTS")
});

/// Counter for adjustment writes, by type and operation.
pub static ADJUSTMENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_adjustments_total",
        "Total number of fee adjustments written",
        &["adjustment_type", "operation"]
    )
    .expect("Failed to register ADJUSTMENTS")
});

/// Counter for fee summaries computed.
pub static SUMMARIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_summaries_total",
        "Total number of fee summaries computed",
        &["annual_charges"]
    )
    .expect("Failed to register SUMMARIES")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_errors_total",
        "Total number of errors",
        &["operation", "error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&STRUCTURES_CREATED);
    Lazy::force(&CONFLICTS);
    Lazy::force(&ADJUSTMENTS);
    Lazy::force(&SUMMARIES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record structures created by one request.
pub fn record_structures_created(mode: &str, count: usize) {
    STRUCTURES_CREATED
        .with_label_values(&[mode])
        .inc_by(count as f64);
}

/// Record the outcome of a conflict check: `rejected`, `overridden` or `none`.
pub fn record_conflict(outcome: &str) {
    CONFLICTS.with_label_values(&[outcome]).inc();
}

/// Record an adjustment write.
pub fn record_adjustment(adjustment_type: &str, operation: &str) {
    ADJUSTMENTS
        .with_label_values(&[adjustment_type, operation])
        .inc();
}

/// Record a computed summary.
pub fn record_summary(billed_annual_charges: bool) {
    let label = if billed_annual_charges { "billed" } else { "none" };
    SUMMARIES.with_label_values(&[label]).inc();
}

/// Record an error.
pub fn record_error(operation: &str, error_type: &str) {
    ERRORS.with_label_values(&[operation, error_type]).inc();
}
