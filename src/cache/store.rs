// Query cache store - Parquet files keyed by query hash, with a TTL

use super::keying::{CacheKey, QueryParams, FILE_EXTENSION, FILE_PREFIX};
use super::models::CacheStatistics;
use super::table::{empty_table, read_parquet, write_parquet, TableOutput};
use crate::config::CacheConfig;
use crate::error::{GuardError, Result};
use crate::metrics;
use arrow::record_batch::RecordBatch;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::fs::{self, File};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

const SECS_PER_HOUR: u64 = 3600;

/// Local file cache for expensive tabular results.
///
/// One Parquet file per [`CacheKey`] under a single directory; the file's
/// modification time is the only freshness metadata. Entries past the TTL
/// stay on disk (they are simply not read) until [`QueryCache::clear`] or
/// the next successful computation overwrites them.
///
/// Concurrent callers computing the same key may both run their compute
/// function; the last writer wins.
#[derive(Debug, Clone)]
pub struct QueryCache {
    directory: PathBuf,
    ttl_hours: u64,
}

impl QueryCache {
    /// Create the cache, making sure the directory exists.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.directory)?;

        info!(
            "Query cache initialized: {} (TTL: {} hours)",
            config.directory.display(),
            config.ttl_hours
        );

        Ok(Self {
            directory: config.directory.clone(),
            ttl_hours: config.ttl_hours,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(SECS_PER_HOUR))
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    /// Whether `key` has a file younger than the TTL. Evaluated at call time.
    ///
    /// Failures other than a missing file are logged and count as not fresh;
    /// use [`QueryCache::check_fresh`] to receive them.
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.check_fresh(key).unwrap_or_else(|e| {
            warn!(key = %key, "Failed to inspect cache file {}: {}", key.file_name(), e);
            false
        })
    }

    /// Like [`QueryCache::is_fresh`], but only a missing file is `Ok(false)`;
    /// any other metadata failure (e.g. permission denied) is returned.
    pub fn check_fresh(&self, key: &CacheKey) -> Result<bool> {
        let age = match file_age(&self.path_for(key)) {
            Ok(age) => age,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let is_fresh = age < self.ttl();
        debug!(
            "Cache {}: {} (age: {:.1}h, TTL: {}h)",
            if is_fresh { "fresh" } else { "expired" },
            key.file_name(),
            age.as_secs_f64() / SECS_PER_HOUR as f64,
            self.ttl_hours
        );
        Ok(is_fresh)
    }

    /// Load the table stored for `key`, regardless of freshness.
    ///
    /// A missing file is [`GuardError::Io`] with `NotFound`; a truncated or
    /// otherwise invalid file is [`GuardError::Parquet`] / [`GuardError::Arrow`].
    pub fn read(&self, key: &CacheKey) -> Result<RecordBatch> {
        let file = File::open(self.path_for(key))?;
        read_parquet(file)
    }

    /// Store `batch` under `key`, replacing any previous entry atomically.
    ///
    /// Empty tables are not stored and yield `Ok(None)`; otherwise returns the
    /// size of the written file.
    pub fn write(&self, key: &CacheKey, batch: &RecordBatch) -> Result<Option<u64>> {
        if batch.num_rows() == 0 {
            debug!("Skipping cache write of empty table for {}", key);
            return Ok(None);
        }

        let path = self.path_for(key);
        let mut tmp = tempfile::Builder::new()
            .prefix(".query_")
            .suffix(".tmp")
            .tempfile_in(&self.directory)?;

        write_parquet(tmp.as_file_mut(), batch)?;
        tmp.as_file().sync_all()?;
        let size = tmp.as_file().metadata()?.len();

        tmp.persist(&path).map_err(|e| GuardError::Io(e.error))?;
        Ok(Some(size))
    }

    /// Return the cached table for `query`/`params`, or compute and cache it.
    ///
    /// - A fresh, readable entry is returned without calling `compute`.
    /// - An entry that is missing or fails to decode counts as a miss; any
    ///   other inspection or read error (e.g. permission denied) is returned
    ///   before `compute` runs.
    /// - Errors from `compute` are returned unchanged.
    /// - Empty or absent results are returned but never stored.
    /// - A failed write is logged; the computed table is still returned.
    pub async fn get_or_compute<F, Fut, T, E>(
        &self,
        query: &str,
        params: Option<&QueryParams>,
        force_refresh: bool,
        compute: F,
    ) -> std::result::Result<RecordBatch, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: TableOutput,
        E: From<GuardError>,
    {
        let key = CacheKey::derive(query, params);
        let file_name = key.file_name();
        debug!("Generated cache key: {}", key);

        if !force_refresh && self.check_fresh(&key)? {
            info!("Loading cached result: {}", file_name);
            match self.read(&key) {
                Ok(batch) => {
                    metrics::record_cache_operation("hit");
                    info!(key = %key, rows = batch.num_rows(), "Cache hit: {} rows loaded", batch.num_rows());
                    return Ok(batch);
                }
                Err(e) if is_recoverable_read_error(&e) => {
                    metrics::record_cache_operation("corrupt");
                    warn!(
                        key = %key,
                        "Failed to load cache file {}: {}. Will re-compute.",
                        file_name,
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        if force_refresh {
            metrics::record_cache_operation("refresh");
            info!("Force refresh requested for: {}", file_name);
        } else {
            metrics::record_cache_operation("miss");
            info!("Cache miss for: {}", file_name);
        }

        info!("Computing new result...");
        let output = compute().await.map_err(|e| {
            error!(key = %key, "Compute function failed");
            e
        })?;

        let table = match output.into_table()? {
            Some(table) => table,
            None => {
                warn!(key = %key, "Compute function returned no result");
                return Ok(empty_table());
            }
        };

        if table.num_rows() == 0 {
            warn!(key = %key, "Compute function returned empty table, not caching");
            return Ok(table);
        }

        match self.write(&key, &table) {
            Ok(Some(size)) => {
                metrics::record_cache_operation("write");
                info!(
                    key = %key,
                    rows = table.num_rows(),
                    size_bytes = size,
                    "Result cached: {} ({} rows, {:.1} MB)",
                    file_name,
                    table.num_rows(),
                    size as f64 / 1024.0 / 1024.0
                );
            }
            Ok(None) => {}
            Err(e) => {
                metrics::record_cache_operation("write_error");
                error!(key = %key, "Failed to cache result: {}", e);
            }
        }

        Ok(table)
    }

    /// Delete entries whose file name matches `pattern` (default: every
    /// cache entry). `*` and `?` are the only wildcards; as with shell globs,
    /// dot-files (including in-flight writes) only match a pattern that itself
    /// starts with `.`.
    ///
    /// Per-file failures are logged and skipped. Returns how many files were
    /// deleted.
    pub fn clear(&self, pattern: Option<&str>) -> Result<usize> {
        let (matcher, include_hidden) = match pattern {
            Some(p) => (glob_to_regex(p)?, p.starts_with('.')),
            None => (DEFAULT_MATCHER.clone(), false),
        };

        let mut deleted = 0;
        for path in self.matching_files(&matcher, include_hidden)? {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    debug!("Deleted cache file: {}", display_name(&path));
                }
                Err(e) => warn!("Failed to delete {}: {}", display_name(&path), e),
            }
        }

        metrics::record_cache_evictions(deleted);
        info!("Cleared {} cache files", deleted);
        Ok(deleted)
    }

    /// Scan the directory and summarise every cache entry.
    ///
    /// Files that cannot be inspected are skipped with a warning.
    pub fn stats(&self) -> Result<CacheStatistics> {
        let ttl = self.ttl();
        let mut stats = CacheStatistics::default();
        let mut oldest: Option<Duration> = None;
        let mut newest: Option<Duration> = None;

        for path in self.matching_files(&DEFAULT_MATCHER, false)? {
            let (size, age) = match fs::metadata(&path).and_then(|m| Ok((m.len(), age_of(&m)?))) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to stat {}: {}", display_name(&path), e);
                    continue;
                }
            };

            stats.file_count += 1;
            stats.total_size_bytes += size;
            if age > ttl {
                stats.stale_count += 1;
            }
            oldest = Some(oldest.map_or(age, |o| o.max(age)));
            newest = Some(newest.map_or(age, |n| n.min(age)));
        }

        stats.oldest_age = oldest.unwrap_or_default();
        stats.newest_age = newest.unwrap_or_default();
        metrics::update_cache_entries(stats.file_count);
        Ok(stats)
    }

    fn matching_files(&self, matcher: &Regex, include_hidden: bool) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|n| (include_hidden || !n.starts_with('.')) && matcher.is_match(n));
            if is_file && matches {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl fmt::Display for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stats() {
            Ok(stats) => write!(
                f,
                "QueryCache(dir='{}', ttl={}h, files={}, size={:.1}MB)",
                self.directory.display(),
                self.ttl_hours,
                stats.file_count,
                stats.total_size_mb()
            ),
            Err(_) => write!(
                f,
                "QueryCache(dir='{}', ttl={}h, unreadable)",
                self.directory.display(),
                self.ttl_hours
            ),
        }
    }
}

/// Missing files and undecodable content are cache misses; everything else
/// points at the deployment and is surfaced.
fn is_recoverable_read_error(err: &GuardError) -> bool {
    match err {
        GuardError::Io(e) => e.kind() == ErrorKind::NotFound,
        GuardError::Parquet(_) | GuardError::Arrow(_) => true,
        _ => false,
    }
}

fn file_age(path: &Path) -> std::io::Result<Duration> {
    age_of(&fs::metadata(path)?)
}

/// Time since last modification; a timestamp in the future counts as zero.
fn age_of(metadata: &fs::Metadata) -> std::io::Result<Duration> {
    let modified = metadata.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

lazy_static! {
    /// File names owned by the cache: `query_<hex>.parquet`.
    static ref DEFAULT_MATCHER: Regex = Regex::new(&format!(
        "^{}[0-9a-f]+\\.{}$",
        regex::escape(FILE_PREFIX),
        regex::escape(FILE_EXTENSION)
    ))
    .unwrap();
}

/// Translate a file-name glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() || pattern.contains(['/', '\\']) {
        return Err(GuardError::InvalidPattern(format!(
            "'{}' must be a non-empty file name pattern",
            pattern
        )));
    }

    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| GuardError::InvalidPattern(e.to_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("query_*.parquet").unwrap();
        assert!(re.is_match("query_0123456789abcdef.parquet"));
        assert!(!re.is_match("query_0123.parquet.tmp"));
        assert!(!re.is_match("other.parquet"));

        let re = glob_to_regex("query_ab??*").unwrap();
        assert!(re.is_match("query_abcd.parquet"));
        assert!(!re.is_match("query_ab"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let re = glob_to_regex("a+b.parquet").unwrap();
        assert!(re.is_match("a+b.parquet"));
        assert!(!re.is_match("aab.parquet"));
        assert!(!re.is_match("a+bxparquet"));
    }

    #[test]
    fn test_glob_rejects_paths() {
        assert!(matches!(
            glob_to_regex("../*.parquet"),
            Err(GuardError::InvalidPattern(_))
        ));
        assert!(matches!(glob_to_regex(""), Err(GuardError::InvalidPattern(_))));
    }

    #[test]
    fn test_default_matcher_ignores_temp_files() {
        let re = &*DEFAULT_MATCHER;
        assert!(re.is_match("query_0123456789abcdef.parquet"));
        assert!(!re.is_match(".query_abc.tmp"));
        assert!(!re.is_match("notes.txt"));
    }

    #[test]
    fn test_recoverable_errors() {
        let missing = GuardError::Io(std::io::Error::from(ErrorKind::NotFound));
        let denied = GuardError::Io(std::io::Error::from(ErrorKind::PermissionDenied));
        let corrupt = GuardError::Parquet(parquet::errors::ParquetError::EOF("eof".into()));

        assert!(is_recoverable_read_error(&missing));
        assert!(is_recoverable_read_error(&corrupt));
        assert!(!is_recoverable_read_error(&denied));
    }
}
