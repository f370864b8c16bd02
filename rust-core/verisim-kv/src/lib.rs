// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VeriSimDB Key-Value Bridge
//
// An ordered, persistent key-value store behind an asynchronous API. Each
// operation becomes a task whose blocking half runs on tokio's blocking pool
// and whose result arrives through a `Completion` future. Range scans go
// through cursors that read a point-in-time snapshot in size-bounded batches
// and coordinate with `close` so the engine is never released under them.
//
// # Modules
//
// - [`engine`] -- The `Engine`, `EngineSnapshot` and `EngineIterator` traits.
// - [`error`] -- `KvError`, `LifecycleError` and `EngineError`.
// - [`options`] -- Open, read, write and cursor options (serde, camelCase).
// - [`database`] -- The `Database` handle and its close coordination.
// - [`cursor`] -- Batched range cursors.
// - [`range`] -- Range bounds and the in-range predicate.
// - [`registry`] -- Generation-checked registry of live cursors.
// - [`datum`] -- Values handed back to callers, as bytes or text.
// - [`task`] -- Task execution and the `Completion` future.
// - [`memory`] -- An in-memory copy-on-write engine.
// - [`metrics`] -- A transparent wrapper that collects engine statistics.
//
// # Example
//
// ```rust
// use verisim_kv::{CursorOptions, Database, OpenOptions, WriteOptions};
//
// # tokio_test::block_on(async {
// let db: Database = Database::new().unwrap();
// db.open("example", OpenOptions::default()).await.unwrap();
// for key in ["a", "b", "c", "d"] {
//     db.put(key, "v", WriteOptions::default()).await.unwrap();
// }
//
// let cursor = db.cursor(CursorOptions::new().gte("b").lt("d")).unwrap();
// let batch = cursor.advance().await.unwrap();
// assert_eq!(batch.keys(), vec![b"b".to_vec(), b"c".to_vec()]);
// cursor.end().await.unwrap();
//
// db.close().await.unwrap();
// # });
// ```

pub mod cursor;
pub mod database;
pub mod datum;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod options;
pub mod range;
pub mod registry;
pub mod task;

// Optional persistent engine, feature-gated (on by default).
#[cfg(feature = "redb-engine")]
pub mod redb_engine;

// Re-export the most commonly used types at the crate root for convenience.
pub use cursor::Cursor;
pub use database::{Database, Status};
pub use datum::{Batch, Datum, Entry};
pub use engine::{Engine, EngineIterator, EngineSnapshot};
pub use error::{EngineError, KvError, KvResult, LifecycleError};
pub use memory::MemoryEngine;
pub use metrics::{EngineStats, MetricsEngine};
pub use options::{CursorOptions, GetOptions, OpenOptions, WriteOptions};
pub use range::Range;
pub use registry::CursorId;
pub use task::Completion;

#[cfg(feature = "redb-engine")]
pub use redb_engine::RedbEngine;
