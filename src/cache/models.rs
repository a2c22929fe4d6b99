//! Cache statistics model.

use std::time::Duration;

const SECS_PER_HOUR: f64 = 3600.0;

/// Summary over every entry in the cache directory, recomputed on demand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Number of entries that could be inspected.
    pub file_count: usize,
    /// Sum of entry sizes on disk.
    pub total_size_bytes: u64,
    /// Age of the least recently written entry (zero when empty).
    pub oldest_age: Duration,
    /// Age of the most recently written entry (zero when empty).
    pub newest_age: Duration,
    /// Entries older than the TTL. Still on disk until cleared or overwritten.
    pub stale_count: usize,
}

impl CacheStatistics {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / 1024.0 / 1024.0
    }

    pub fn oldest_age_hours(&self) -> f64 {
        self.oldest_age.as_secs_f64() / SECS_PER_HOUR
    }

    pub fn newest_age_hours(&self) -> f64 {
        self.newest_age.as_secs_f64() / SECS_PER_HOUR
    }
}
