// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for key-value engines.
//
// Wraps any `Engine` and counts point operations and snapshots, along with
// latency sums and bytes moved. Cursor reads go through the inner engine's
// iterators untouched; only the snapshot that backs each cursor is counted.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::options::{EngineResources, OpenOptions, ReadOptions, WriteOptions};
use crate::task::lock;

/// Accumulated statistics for an engine.
///
/// All counters are monotonically increasing until [`MetricsEngine::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// Number of `put` operations performed.
    pub put_count: u64,
    /// Number of `delete` operations performed.
    pub delete_count: u64,
    /// Number of snapshots taken (one per cursor).
    pub snapshot_count: u64,
    /// Cumulative wall-clock latency of all `get` calls, in milliseconds.
    pub get_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all `put` calls, in milliseconds.
    pub put_latency_sum_ms: f64,
    /// Total value bytes returned by `get`.
    pub total_bytes_read: u64,
    /// Total key and value bytes accepted by `put`.
    pub total_bytes_written: u64,
}

/// An engine wrapper that collects operation metrics.
///
/// Open a database over `MetricsEngine<E>` instead of `E` and read the
/// counters through [`crate::Database::engine`].
///
/// # Example
///
/// ```rust
/// use verisim_kv::{Database, GetOptions, MemoryEngine, MetricsEngine, OpenOptions, WriteOptions};
///
/// # tokio_test::block_on(async {
/// let db = Database::<MetricsEngine<MemoryEngine>>::new().unwrap();
/// db.open("metered", OpenOptions::default()).await.unwrap();
///
/// db.put("key", "value", WriteOptions::default()).await.unwrap();
/// db.get("key", GetOptions::default()).await.unwrap();
///
/// let stats = db.engine().unwrap().stats();
/// assert_eq!(stats.put_count, 1);
/// assert_eq!(stats.get_count, 1);
/// # });
/// ```
pub struct MetricsEngine<E: Engine> {
    inner: E,
    stats: Mutex<EngineStats>,
}

impl<E: Engine> MetricsEngine<E> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// Return a copy of the current statistics.
    pub fn stats(&self) -> EngineStats {
        lock(&self.stats).clone()
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        *lock(&self.stats) = EngineStats::default();
    }

    /// Return a reference to the inner engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl<E: Engine> Engine for MetricsEngine<E> {
    type Snapshot = E::Snapshot;

    fn open(
        location: &Path,
        options: &OpenOptions,
        resources: &EngineResources,
    ) -> Result<Self, EngineError> {
        E::open(location, options, resources).map(Self::new)
    }

    fn get(&self, key: &[u8], options: &ReadOptions) -> Result<Option<Vec<u8>>, EngineError> {
        let start = Instant::now();
        let result = self.inner.get(key, options);
        let elapsed = elapsed_ms(start);

        let mut s = lock(&self.stats);
        s.get_count += 1;
        s.get_latency_sum_ms += elapsed;
        if let Ok(Some(ref val)) = result {
            s.total_bytes_read += val.len() as u64;
        }

        result
    }

    fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<(), EngineError> {
        let start = Instant::now();
        let result = self.inner.put(key, value, options);
        let elapsed = elapsed_ms(start);

        let mut s = lock(&self.stats);
        s.put_count += 1;
        s.put_latency_sum_ms += elapsed;
        if result.is_ok() {
            s.total_bytes_written += (key.len() + value.len()) as u64;
        }

        result
    }

    fn delete(&self, key: &[u8], options: &WriteOptions) -> Result<(), EngineError> {
        lock(&self.stats).delete_count += 1;
        self.inner.delete(key, options)
    }

    fn snapshot(&self) -> Result<Self::Snapshot, EngineError> {
        lock(&self.stats).snapshot_count += 1;
        self.inner.snapshot()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
