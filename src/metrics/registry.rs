// Prometheus metrics registry and collectors

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_vec_with_registry, register_histogram_vec_with_registry, Counter, CounterVec,
    Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REMOTE QUERY METRICS
    // ============================================================================

    /// Remote call duration (dry runs and executions)
    pub static ref REMOTE_CALL_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("remote_call_duration_seconds", "Remote query service call duration")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["operation"], // operation: dry_run, execute
        REGISTRY
    ).unwrap();

    /// Bytes reported by the service
    pub static ref QUERY_BYTES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("query_bytes_total", "Bytes estimated by dry runs and billed by executions"),
        &["kind"], // kind: estimated, billed
        REGISTRY
    ).unwrap();

    /// Queries refused by the cost guard
    pub static ref QUERIES_REFUSED: Counter = register_counter_with_registry!(
        Opts::new("queries_refused_total", "Queries refused for exceeding the byte ceiling"),
        REGISTRY
    ).unwrap();

    /// Access token refreshes
    pub static ref TOKEN_REFRESHES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("token_refresh_total", "Total OAuth token refresh attempts"),
        &["status"], // status: success, failure
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, refresh, write, corrupt, write_error, evict
        REGISTRY
    ).unwrap();

    /// Entries seen by the last stats scan
    pub static ref CACHE_ENTRIES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("cache_entries_current", "Current number of cache entries"),
        &["type"], // type: files
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
