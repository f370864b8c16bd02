// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Option structs for every caller-facing operation.
//
// Field names follow the host configuration objects (`createIfMissing`,
// `highWaterMark`, ...) so a JSON object from the host deserializes straight
// into the matching struct. Missing fields take their defaults; only a
// malformed value is an error.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::KvResult;

/// Default block cache size: 8 MiB.
pub const DEFAULT_CACHE_SIZE: usize = 8 << 20;
/// Default write buffer size: 4 MiB.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 << 20;
/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
/// Default open file budget.
pub const DEFAULT_MAX_OPEN_FILES: u32 = 1000;
/// Default number of keys between restart points.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: u32 = 16;
/// Default maximum table file size: 2 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 2 << 20;
/// Bloom filter bits per key. Fixed.
pub const BLOOM_BITS_PER_KEY: u32 = 10;
/// Default cursor batch budget: 16 KiB.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Parse an options struct from a host configuration object.
///
/// `null` yields the defaults.
pub fn from_json<T>(value: serde_json::Value) -> KvResult<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

/// Options for [`crate::Database::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenOptions {
    /// Create the store if it does not exist.
    pub create_if_missing: bool,
    /// Fail if the store already exists.
    pub error_if_exists: bool,
    /// Compress table blocks.
    pub compression: bool,
    /// Block cache capacity in bytes.
    pub cache_size: usize,
    pub write_buffer_size: usize,
    pub block_size: usize,
    pub max_open_files: u32,
    pub block_restart_interval: u32,
    pub max_file_size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            compression: true,
            cache_size: DEFAULT_CACHE_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl OpenOptions {
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.error_if_exists = error;
        self
    }

    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }
}

/// Block cache handed to the engine at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCache {
    capacity: usize,
}

impl BlockCache {
    /// An LRU block cache holding up to `capacity` bytes.
    pub fn lru(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Filter policy consulted by the engine on point reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    Bloom { bits_per_key: u32 },
}

/// Resources the database owns on behalf of the engine between open and
/// close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResources {
    pub cache: BlockCache,
    pub filter: FilterPolicy,
}

impl EngineResources {
    pub fn from_options(options: &OpenOptions) -> Self {
        Self {
            cache: BlockCache::lru(options.cache_size),
            filter: FilterPolicy::Bloom {
                bits_per_key: BLOOM_BITS_PER_KEY,
            },
        }
    }
}

/// Write options for `put` and `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteOptions {
    /// Flush to stable storage before completing.
    pub sync: bool,
}

impl WriteOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

/// Engine-level read options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Populate the block cache with blocks read for this operation.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Options for [`crate::Database::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetOptions {
    /// Return the value as raw bytes rather than text.
    pub as_buffer: bool,
    pub fill_cache: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            as_buffer: true,
            fill_cache: true,
        }
    }
}

impl GetOptions {
    pub fn as_text() -> Self {
        Self {
            as_buffer: false,
            ..Self::default()
        }
    }

    pub(crate) fn read_options(&self) -> ReadOptions {
        ReadOptions {
            fill_cache: self.fill_cache,
        }
    }
}

/// Options for [`crate::Database::cursor`].
///
/// Bounds accept either a string or a byte array when parsed from JSON. An
/// empty bound is treated as absent. A negative `limit` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CursorOptions {
    pub reverse: bool,
    /// Materialize keys.
    pub keys: bool,
    /// Materialize values.
    pub values: bool,
    pub fill_cache: bool,
    pub key_as_buffer: bool,
    pub value_as_buffer: bool,
    #[serde(deserialize_with = "signed_limit")]
    pub limit: Option<u64>,
    /// Byte budget for one advance.
    pub high_water_mark: usize,
    /// Return the first entry of the cursor's lifetime as its own batch.
    pub eager_first_result: bool,
    #[serde(deserialize_with = "bound")]
    pub start: Option<Vec<u8>>,
    #[serde(deserialize_with = "bound")]
    pub end: Option<Vec<u8>>,
    #[serde(deserialize_with = "bound")]
    pub lt: Option<Vec<u8>>,
    #[serde(deserialize_with = "bound")]
    pub lte: Option<Vec<u8>>,
    #[serde(deserialize_with = "bound")]
    pub gt: Option<Vec<u8>>,
    #[serde(deserialize_with = "bound")]
    pub gte: Option<Vec<u8>>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            keys: true,
            values: true,
            fill_cache: false,
            key_as_buffer: true,
            value_as_buffer: true,
            limit: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            eager_first_result: false,
            start: None,
            end: None,
            lt: None,
            lte: None,
            gt: None,
            gte: None,
        }
    }
}

fn non_empty(key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
    let key = key.as_ref();
    (!key.is_empty()).then(|| key.to_vec())
}

impl CursorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn keys(mut self, keys: bool) -> Self {
        self.keys = keys;
        self
    }

    pub fn values(mut self, values: bool) -> Self {
        self.values = values;
        self
    }

    /// Render keys and values as text instead of raw bytes.
    pub fn as_text(mut self) -> Self {
        self.key_as_buffer = false;
        self.value_as_buffer = false;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn high_water_mark(mut self, bytes: usize) -> Self {
        self.high_water_mark = bytes;
        self
    }

    pub fn eager_first_result(mut self, eager: bool) -> Self {
        self.eager_first_result = eager;
        self
    }

    pub fn start(mut self, key: impl AsRef<[u8]>) -> Self {
        self.start = non_empty(key);
        self
    }

    pub fn end(mut self, key: impl AsRef<[u8]>) -> Self {
        self.end = non_empty(key);
        self
    }

    pub fn lt(mut self, key: impl AsRef<[u8]>) -> Self {
        self.lt = non_empty(key);
        self
    }

    pub fn lte(mut self, key: impl AsRef<[u8]>) -> Self {
        self.lte = non_empty(key);
        self
    }

    pub fn gt(mut self, key: impl AsRef<[u8]>) -> Self {
        self.gt = non_empty(key);
        self
    }

    pub fn gte(mut self, key: impl AsRef<[u8]>) -> Self {
        self.gte = non_empty(key);
        self
    }

    pub(crate) fn read_options(&self) -> ReadOptions {
        ReadOptions {
            fill_cache: self.fill_cache,
        }
    }
}

fn bound<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawBound {
        Text(String),
        Bytes(Vec<u8>),
    }

    let raw = Option::<RawBound>::deserialize(deserializer)?;
    Ok(raw
        .map(|raw| match raw {
            RawBound::Text(text) => text.into_bytes(),
            RawBound::Bytes(bytes) => bytes,
        })
        .filter(|bytes| !bytes.is_empty()))
}

fn signed_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|limit| u64::try_from(limit).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use serde_json::json;

    #[test]
    fn test_open_defaults() {
        let options = OpenOptions::default();
        assert!(options.create_if_missing);
        assert!(!options.error_if_exists);
        assert!(options.compression);
        assert_eq!(options.cache_size, 8 * 1024 * 1024);
        assert_eq!(options.write_buffer_size, 4 * 1024 * 1024);
        assert_eq!(options.block_size, 4096);
        assert_eq!(options.max_open_files, 1000);
        assert_eq!(options.block_restart_interval, 16);
        assert_eq!(options.max_file_size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_open_from_partial_json() {
        let options: OpenOptions =
            from_json(json!({ "createIfMissing": false, "cacheSize": 1024 })).unwrap();
        assert!(!options.create_if_missing);
        assert_eq!(options.cache_size, 1024);
        // Everything else keeps its default.
        assert_eq!(options.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_null_means_defaults() {
        let options: CursorOptions = from_json(serde_json::Value::Null).unwrap();
        assert_eq!(options, CursorOptions::default());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result: KvResult<OpenOptions> = from_json(json!({ "cacheSize": "huge" }));
        assert!(matches!(result, Err(KvError::Config(_))));
    }

    #[test]
    fn test_resources_use_cache_size_and_fixed_bloom() {
        let resources = EngineResources::from_options(&OpenOptions::default().cache_size(4096));
        assert_eq!(resources.cache.capacity(), 4096);
        assert_eq!(resources.filter, FilterPolicy::Bloom { bits_per_key: 10 });
    }

    #[test]
    fn test_get_defaults() {
        let options = GetOptions::default();
        assert!(options.as_buffer);
        assert!(options.fill_cache);
        assert!(!GetOptions::as_text().as_buffer);
    }

    #[test]
    fn test_cursor_defaults() {
        let options = CursorOptions::default();
        assert!(!options.reverse);
        assert!(options.keys && options.values);
        assert!(!options.fill_cache);
        assert!(options.key_as_buffer && options.value_as_buffer);
        assert_eq!(options.limit, None);
        assert_eq!(options.high_water_mark, 16 * 1024);
    }

    #[test]
    fn test_cursor_bounds_from_text_and_bytes() {
        let options: CursorOptions = from_json(json!({
            "gte": "b",
            "lt": [101],
            "end": "",
            "limit": -1,
            "highWaterMark": 1,
        }))
        .unwrap();
        assert_eq!(options.gte, Some(b"b".to_vec()));
        assert_eq!(options.lt, Some(b"e".to_vec()));
        assert_eq!(options.end, None);
        assert_eq!(options.limit, None);
        assert_eq!(options.high_water_mark, 1);
    }

    #[test]
    fn test_cursor_positive_limit() {
        let options: CursorOptions = from_json(json!({ "limit": 2 })).unwrap();
        assert_eq!(options.limit, Some(2));
    }

    #[test]
    fn test_builder_ignores_empty_bounds() {
        let options = CursorOptions::new().start("").gt("a");
        assert_eq!(options.start, None);
        assert_eq!(options.gt, Some(b"a".to_vec()));
    }
}
