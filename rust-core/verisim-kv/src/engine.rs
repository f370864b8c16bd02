// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordered key-value engine contract.
//
// The database and cursor layers never touch storage directly; they drive an
// `Engine` through these traits from inside blocking tasks. All calls are
// synchronous and may block. Keys are ordered bytewise.

use std::path::Path;

use crate::error::EngineError;
use crate::options::{EngineResources, OpenOptions, ReadOptions, WriteOptions};

/// An ordered, persistent key-value engine.
///
/// Implementations must be safe to share across threads: point operations
/// from different tasks may run concurrently. Closing is dropping; the
/// database guarantees no snapshot or iterator outlives the engine handle it
/// came from.
pub trait Engine: Send + Sync + Sized + 'static {
    /// Point-in-time view used by cursors.
    type Snapshot: EngineSnapshot;

    /// Open (or create) the store at `location`.
    fn open(
        location: &Path,
        options: &OpenOptions,
        resources: &EngineResources,
    ) -> Result<Self, EngineError>;

    /// Retrieve the value associated with `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist, rather than an error.
    fn get(&self, key: &[u8], options: &ReadOptions) -> Result<Option<Vec<u8>>, EngineError>;

    /// Store a key-value pair, overwriting any previous value for `key`.
    fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<(), EngineError>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8], options: &WriteOptions) -> Result<(), EngineError>;

    /// Capture the current contents. Released on drop.
    fn snapshot(&self) -> Result<Self::Snapshot, EngineError>;

    /// A human-readable name for this engine, used in logging.
    fn name(&self) -> &str;
}

/// Immutable view of an engine at one point in time.
pub trait EngineSnapshot: Send + 'static {
    type Iter: EngineIterator;

    /// Create an unpositioned iterator over this snapshot.
    fn iter(&self, options: &ReadOptions) -> Result<Self::Iter, EngineError>;
}

/// Bidirectional iterator over a snapshot.
///
/// A fresh iterator is invalid until positioned by one of the seek methods.
/// `next`/`prev` on an invalid iterator leave it invalid. `key`/`value` on an
/// invalid iterator return an empty slice.
pub trait EngineIterator: Send + 'static {
    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    /// Position at the first key `>= target`.
    fn seek(&mut self, target: &[u8]);

    fn next(&mut self);

    fn prev(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    /// First error hit while moving, if any. Sticky.
    fn status(&self) -> Result<(), &EngineError>;
}
