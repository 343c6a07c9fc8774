//! Prometheus metrics for storage operations
//!
//! Defines metrics for:
//! - Operation counts by operation and outcome
//! - Operation duration by operation

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::errors::StorageError;

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Storage operation counter by operation and status
    pub static ref STORAGE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("s3storage_operations_total", "Total storage operations"),
        &["operation", "status"]
    )
    .expect("Failed to create STORAGE_OPERATIONS metric");

    /// Storage operation duration histogram
    pub static ref STORAGE_OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "s3storage_operation_duration_seconds",
            "Storage operation duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric");
}

/// Register the storage metrics with [`REGISTRY`]
///
/// Metrics are recorded whether or not they are registered; registering
/// only makes them visible to `REGISTRY.gather()`.
pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(STORAGE_OPERATIONS.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    Ok(())
}

/// Record one finished operation.
pub fn record(operation: &str, elapsed: Duration, error: Option<&StorageError>) {
    let status = error.map_or("ok", StorageError::kind);
    STORAGE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    STORAGE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}
