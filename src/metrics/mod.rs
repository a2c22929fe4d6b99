// Metrics module for Prometheus observability

mod registry;

pub use registry::{
    gather_metrics, CACHE_ENTRIES, CACHE_OPERATIONS, QUERIES_REFUSED, QUERY_BYTES,
    REMOTE_CALL_DURATION, TOKEN_REFRESHES,
};

/// Helper to record a dry run or execution round trip
pub fn record_remote_call(operation: &str, duration_secs: f64) {
    REMOTE_CALL_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Helper to record bytes reported by the service (estimated or billed)
pub fn record_bytes(kind: &str, bytes: u64) {
    if bytes > 0 {
        QUERY_BYTES.with_label_values(&[kind]).inc_by(bytes as f64);
    }
}

pub fn record_refusal() {
    QUERIES_REFUSED.inc();
}

/// Helper to record a token refresh
pub fn record_token_refresh(success: bool) {
    let status = if success { "success" } else { "failure" };
    TOKEN_REFRESHES.with_label_values(&[status]).inc();
}

/// Helper to record cache operations
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn record_cache_evictions(count: usize) {
    if count > 0 {
        CACHE_OPERATIONS
            .with_label_values(&["evict"])
            .inc_by(count as f64);
    }
}

pub fn update_cache_entries(count: usize) {
    CACHE_ENTRIES.with_label_values(&["files"]).set(count as f64);
}
