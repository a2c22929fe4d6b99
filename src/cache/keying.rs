//! Deterministic cache keys derived from query text and parameters.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Length of a rendered [`CacheKey`] in hex characters.
pub const KEY_LENGTH: usize = 16;

/// Prefix and extension of every file the cache owns.
pub const FILE_PREFIX: &str = "query_";
pub const FILE_EXTENSION: &str = "parquet";

const PARAMS_SEPARATOR: &str = "__PARAMS__";

/// Named query parameters, kept sorted by name.
///
/// Two maps built from the same pairs in any order compare and key equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Name-sorted `[[name, value], ...]` rendering used for hashing.
    fn canonical(&self) -> String {
        let pairs: Vec<(&String, &Value)> = self.0.iter().collect();
        // Serializing borrowed strings and JSON values cannot fail.
        serde_json::to_string(&pairs).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Fixed-length hex identifier of a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `query` and optional `params`.
    ///
    /// The query is trimmed; parameters are appended in name order behind a
    /// fixed separator and the SHA-256 digest is truncated to
    /// [`KEY_LENGTH`] hex characters. Pure: no I/O, clock or randomness.
    pub fn derive(query: &str, params: Option<&QueryParams>) -> Self {
        let mut input = query.trim().to_string();

        if let Some(params) = params.filter(|p| !p.is_empty()) {
            input.push_str(PARAMS_SEPARATOR);
            input.push_str(&params.canonical());
        }

        let digest = Sha256::digest(input.as_bytes());
        Self(hex::encode(&digest[..KEY_LENGTH / 2]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the file holding this entry inside the cache directory.
    pub fn file_name(&self) -> String {
        format!("{}{}.{}", FILE_PREFIX, self.0, FILE_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
