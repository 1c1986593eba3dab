//! Store metrics collection.
//!
//! Provides standardized metrics for monitoring store operations:
//! - Operation counters by operation, collection and outcome
//! - Latency histograms
//! - Written document counters

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by operation, collection and outcome.
    pub const OPERATIONS_TOTAL: &str = "vframe_store_operations_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vframe_store_latency_seconds";

    /// Documents written (inserted, updated, merged or replaced).
    pub const DOCUMENTS_WRITTEN_TOTAL: &str = "vframe_store_documents_written_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed store operation.
pub fn record_operation(operation: &str, collection: &str, ok: bool, latency_ms: f64) {
    let outcome = if ok { "ok" } else { "error" };

    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation.to_string(),
        "collection" => collection.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record documents written by an operation.
pub fn record_written(operation: &str, count: u64) {
    counter!(
        names::DOCUMENTS_WRITTEN_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OPERATIONS_TOTAL.contains("operations"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
        assert!(names::DOCUMENTS_WRITTEN_TOTAL.contains("written"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_operation("insert_many", "frames", true, 1.5);
        record_written("insert_many", 3);
    }
}
