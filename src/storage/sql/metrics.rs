//! Operation metrics for the SQL backend.

use std::time::Instant;

use crate::Result;

/// Records operation metrics for a storage operation.
///
/// Two metrics are recorded per call:
/// 1. `storage_operations_total` - counter by backend, operation and status
/// 2. `storage_operation_duration_ms` - latency histogram with the same labels
///
/// `NotFound` counts as a success: a missing key is an answer, not a failure.
pub fn record_operation_metrics<T>(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    result: &Result<T>,
) {
    let status = match result {
        Ok(_) | Err(crate::Error::NotFound) => "success",
        Err(_) => "error",
    };
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
