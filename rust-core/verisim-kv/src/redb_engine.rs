// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent engine for VeriSimDB KV.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable key-value storage. No C/C++ dependencies, so it builds on any platform
// with a Rust toolchain.
//
// # Design
//
// - `location` is a directory holding a single redb file with one table.
// - Read transactions for point reads; a held read transaction is a snapshot.
// - Write transactions for put/delete (serialised by redb internally).
// - Iterators re-query the table from the current key on every step, so they
//   own the table handle and borrow nothing.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use redb::{
    AccessGuard, Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, TableDefinition,
    TableError,
};
use tracing::debug;

use crate::engine::{Engine, EngineIterator, EngineSnapshot};
use crate::error::EngineError;
use crate::options::{EngineResources, OpenOptions, ReadOptions, WriteOptions};

/// Table definition for the main key-value store.
const MAIN_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("main");

/// File name of the redb database inside the store directory.
pub const DATA_FILE: &str = "kv.redb";

type MainTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

/// A persistent engine powered by redb.
///
/// Thread-safe: `Database` is `Send + Sync` and handles internal locking.
/// The block cache size from [`EngineResources`] becomes redb's page cache.
/// Compression, block and file sizing options have no redb counterpart and
/// are accepted as-is.
pub struct RedbEngine {
    /// The redb database handle.
    db: Database,
    /// Path to the database file (for diagnostics).
    path: PathBuf,
}

impl RedbEngine {
    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEngine")
            .field("path", &self.path)
            .finish()
    }
}

impl Engine for RedbEngine {
    type Snapshot = RedbSnapshot;

    fn open(
        location: &Path,
        options: &OpenOptions,
        resources: &EngineResources,
    ) -> Result<Self, EngineError> {
        let path = location.join(DATA_FILE);
        let exists = path.exists();

        if exists && options.error_if_exists {
            return Err(EngineError::InvalidArgument(format!(
                "{}: exists (error_if_exists is true)",
                location.display()
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(EngineError::InvalidArgument(format!(
                "{}: does not exist (create_if_missing is false)",
                location.display()
            )));
        }
        if !exists {
            std::fs::create_dir_all(location)?;
        }

        let mut builder = Database::builder();
        builder.set_cache_size(resources.cache.capacity());
        let db = builder.create(&path).map_err(|e| {
            EngineError::Unavailable(format!("failed to open redb at {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), cache_bytes = resources.cache.capacity(), "opened redb engine");

        Ok(Self { db, path })
    }

    fn get(&self, key: &[u8], _options: &ReadOptions) -> Result<Option<Vec<u8>>, EngineError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| EngineError::Unavailable(format!("read txn: {e}")))?;

        let table = match open_main(&txn)? {
            Some(t) => t,
            // No table until the first write.
            None => return Ok(None),
        };

        match table.get(key) {
            Ok(Some(value)) => Ok(Some(value.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(EngineError::Corruption(format!("get: {e}"))),
        }
    }

    // redb fsyncs every commit, so `sync: false` is not weaker here.
    fn put(&self, key: &[u8], value: &[u8], _options: &WriteOptions) -> Result<(), EngineError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| EngineError::Unavailable(format!("write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(MAIN_TABLE)
                .map_err(|e| EngineError::Unavailable(format!("open table: {e}")))?;
            table
                .insert(key, value)
                .map_err(|e| EngineError::Corruption(format!("insert: {e}")))?;
        }
        txn.commit()
            .map_err(|e| EngineError::Corruption(format!("commit: {e}")))
    }

    fn delete(&self, key: &[u8], _options: &WriteOptions) -> Result<(), EngineError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| EngineError::Unavailable(format!("write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(MAIN_TABLE)
                .map_err(|e| EngineError::Unavailable(format!("open table: {e}")))?;
            table
                .remove(key)
                .map_err(|e| EngineError::Corruption(format!("remove: {e}")))?;
        }
        txn.commit()
            .map_err(|e| EngineError::Corruption(format!("commit: {e}")))
    }

    fn snapshot(&self) -> Result<RedbSnapshot, EngineError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| EngineError::Unavailable(format!("snapshot txn: {e}")))?;
        Ok(RedbSnapshot { txn })
    }

    fn name(&self) -> &str {
        "redb"
    }
}

fn open_main(txn: &ReadTransaction) -> Result<Option<MainTable>, EngineError> {
    match txn.open_table(MAIN_TABLE) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(EngineError::Unavailable(format!("open table: {e}"))),
    }
}

/// A held redb read transaction.
pub struct RedbSnapshot {
    txn: ReadTransaction,
}

impl EngineSnapshot for RedbSnapshot {
    type Iter = RedbIter;

    fn iter(&self, _options: &ReadOptions) -> Result<RedbIter, EngineError> {
        Ok(RedbIter {
            table: open_main(&self.txn)?,
            current: None,
            error: None,
        })
    }
}

/// Iterator over a [`RedbSnapshot`].
///
/// A snapshot taken before the first write has no table; its iterator is
/// simply never valid.
pub struct RedbIter {
    table: Option<MainTable>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    error: Option<EngineError>,
}

type Guarded<'a> = (AccessGuard<'a, &'static [u8]>, AccessGuard<'a, &'static [u8]>);

fn owned(entry: Option<Result<Guarded<'_>, redb::StorageError>>) -> Result<Option<(Vec<u8>, Vec<u8>)>, redb::StorageError> {
    match entry {
        Some(Ok((k, v))) => Ok(Some((k.value().to_vec(), v.value().to_vec()))),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

impl RedbIter {
    fn step<F>(&mut self, locate: F)
    where
        F: FnOnce(&MainTable) -> Result<Option<(Vec<u8>, Vec<u8>)>, redb::StorageError>,
    {
        let Some(table) = &self.table else {
            self.current = None;
            return;
        };
        match locate(table) {
            Ok(entry) => self.current = entry,
            Err(e) => {
                self.current = None;
                if self.error.is_none() {
                    self.error = Some(EngineError::Corruption(format!("range scan: {e}")));
                }
            }
        }
    }
}

impl EngineIterator for RedbIter {
    fn seek_to_first(&mut self) {
        self.step(|table| owned(table.range::<&[u8]>(..)?.next()));
    }

    fn seek_to_last(&mut self) {
        self.step(|table| owned(table.range::<&[u8]>(..)?.next_back()));
    }

    fn seek(&mut self, target: &[u8]) {
        self.step(|table| owned(table.range::<&[u8]>(target..)?.next()));
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        self.step(|table| {
            owned(
                table
                    .range::<&[u8]>((Bound::Excluded(key.as_slice()), Bound::Unbounded))?
                    .next(),
            )
        });
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        self.step(|table| owned(table.range::<&[u8]>(..key.as_slice())?.next_back()));
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, v)| v.as_slice())
    }

    fn status(&self) -> Result<(), &EngineError> {
        match &self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
