// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory engine for VeriSimDB KV.
//
// Uses a `BTreeMap` behind an `Arc` so snapshots are a pointer copy: writers
// go through `Arc::make_mut`, which clones the map only while a snapshot is
// still holding the previous version. Intended for testing, development, and
// small ephemeral datasets. Nothing survives a close.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::{Engine, EngineIterator, EngineSnapshot};
use crate::error::EngineError;
use crate::options::{EngineResources, OpenOptions, ReadOptions, WriteOptions};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory engine backed by a sorted, copy-on-write `BTreeMap`.
///
/// # Example
///
/// ```rust
/// use verisim_kv::engine::Engine;
/// use verisim_kv::memory::MemoryEngine;
/// use verisim_kv::options::{ReadOptions, WriteOptions};
///
/// let engine = MemoryEngine::new();
/// engine.put(b"hello", b"world", &WriteOptions::default()).unwrap();
/// let val = engine.get(b"hello", &ReadOptions::default()).unwrap();
/// assert_eq!(val, Some(b"world".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    data: RwLock<Arc<Map>>,
}

impl MemoryEngine {
    /// Create a new, empty in-memory engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Return true if the store contains no keys.
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn current(&self) -> Arc<Map> {
        Arc::clone(&self.data.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Map) -> R) -> R {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }
}

impl Engine for MemoryEngine {
    type Snapshot = MemorySnapshot;

    fn open(
        _location: &Path,
        _options: &OpenOptions,
        _resources: &EngineResources,
    ) -> Result<Self, EngineError> {
        Ok(Self::new())
    }

    fn get(&self, key: &[u8], _options: &ReadOptions) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.current().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], _options: &WriteOptions) -> Result<(), EngineError> {
        self.write(|map| map.insert(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8], _options: &WriteOptions) -> Result<(), EngineError> {
        self.write(|map| map.remove(key));
        Ok(())
    }

    fn snapshot(&self) -> Result<MemorySnapshot, EngineError> {
        Ok(MemorySnapshot {
            data: self.current(),
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// A frozen version of a [`MemoryEngine`]'s map.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    data: Arc<Map>,
}

impl EngineSnapshot for MemorySnapshot {
    type Iter = MemoryIter;

    fn iter(&self, _options: &ReadOptions) -> Result<MemoryIter, EngineError> {
        Ok(MemoryIter {
            data: Arc::clone(&self.data),
            current: None,
        })
    }
}

/// Iterator over a [`MemorySnapshot`]. Every step is a range lookup from the
/// current key, so the iterator holds no borrow of the map.
#[derive(Debug)]
pub struct MemoryIter {
    data: Arc<Map>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemoryIter {
    fn land<'a>(&mut self, entry: Option<(&'a Vec<u8>, &'a Vec<u8>)>) {
        self.current = entry.map(|(k, v)| (k.clone(), v.clone()));
    }
}

impl EngineIterator for MemoryIter {
    fn seek_to_first(&mut self) {
        let data = Arc::clone(&self.data);
        self.land(data.iter().next());
    }

    fn seek_to_last(&mut self) {
        let data = Arc::clone(&self.data);
        self.land(data.iter().next_back());
    }

    fn seek(&mut self, target: &[u8]) {
        let data = Arc::clone(&self.data);
        self.land(
            data.range::<[u8], _>((Bound::Included(target), Bound::Unbounded))
                .next(),
        );
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let data = Arc::clone(&self.data);
        self.land(
            data.range::<[u8], _>((Bound::Excluded(key.as_slice()), Bound::Unbounded))
                .next(),
        );
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let data = Arc::clone(&self.data);
        self.land(
            data.range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_slice())))
                .next_back(),
        );
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(keys: &[&str]) -> MemoryEngine {
        let engine = MemoryEngine::new();
        for key in keys {
            engine
                .put(key.as_bytes(), key.to_uppercase().as_bytes(), &WriteOptions::default())
                .unwrap();
        }
        engine
    }

    fn iter_of(engine: &MemoryEngine) -> MemoryIter {
        engine.snapshot().unwrap().iter(&ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_basic_crud() {
        let engine = MemoryEngine::new();
        let read = ReadOptions::default();
        let write = WriteOptions::default();

        assert!(engine.is_empty());
        assert_eq!(engine.get(b"key1", &read).unwrap(), None);

        engine.put(b"key1", b"value1", &write).unwrap();
        assert_eq!(engine.get(b"key1", &read).unwrap(), Some(b"value1".to_vec()));
        assert_eq!(engine.len(), 1);

        // Overwrite.
        engine.put(b"key1", b"updated", &write).unwrap();
        assert_eq!(engine.get(b"key1", &read).unwrap(), Some(b"updated".to_vec()));
        assert_eq!(engine.len(), 1);

        engine.delete(b"key1", &write).unwrap();
        assert_eq!(engine.get(b"key1", &read).unwrap(), None);

        // Deleting an absent key is fine.
        engine.delete(b"nonexistent", &write).unwrap();
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let engine = filled(&["a", "b"]);
        let snapshot = engine.snapshot().unwrap();

        engine.put(b"c", b"C", &WriteOptions::default()).unwrap();
        engine.delete(b"a", &WriteOptions::default()).unwrap();

        let mut iter = snapshot.iter(&ReadOptions::default()).unwrap();
        iter.seek_to_first();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_seek_lands_on_first_key_at_or_after_target() {
        let engine = filled(&["a", "c", "e"]);
        let mut iter = iter_of(&engine);

        assert!(!iter.valid());
        iter.seek(b"b");
        assert_eq!(iter.key(), b"c");
        assert_eq!(iter.value(), b"C");

        iter.seek(b"c");
        assert_eq!(iter.key(), b"c");

        iter.seek(b"f");
        assert!(!iter.valid());
        assert_eq!(iter.key(), b"");
    }

    #[test]
    fn test_walk_both_directions() {
        let engine = filled(&["a", "b", "c"]);
        let mut iter = iter_of(&engine);

        iter.seek_to_last();
        assert_eq!(iter.key(), b"c");
        iter.prev();
        assert_eq!(iter.key(), b"b");
        iter.next();
        assert_eq!(iter.key(), b"c");
        iter.next();
        assert!(!iter.valid());

        // Stepping an invalid iterator keeps it invalid.
        iter.prev();
        assert!(!iter.valid());

        iter.seek_to_first();
        assert_eq!(iter.key(), b"a");
        iter.prev();
        assert!(!iter.valid());
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_empty_engine_iterates_nothing() {
        let engine = MemoryEngine::new();
        let mut iter = iter_of(&engine);
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
        assert_eq!(engine.name(), "in-memory");
    }
}
