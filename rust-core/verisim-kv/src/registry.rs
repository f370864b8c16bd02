// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Registry of live cursors.
//
// An arena of weak references indexed by generation-checked handles. The
// database uses it to know which cursors still hold a snapshot, and so
// whether a close may run. Slots are reused; the generation counter only
// grows, so a handle from a removed cursor never matches a later occupant.

use std::fmt;
use std::sync::{Arc, Weak};

/// Handle of a registered cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId {
    index: u32,
    generation: u64,
}

impl CursorId {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Monotonic across the database's lifetime.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    entry: Option<Weak<T>>,
}

/// Arena of weak cursor references.
#[derive(Debug)]
pub(crate) struct CursorRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    next_generation: u64,
    live: usize,
}

impl<T> Default for CursorRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_generation: 0,
            live: 0,
        }
    }
}

impl<T> CursorRegistry<T> {
    pub(crate) fn insert(&mut self, cursor: Weak<T>) -> CursorId {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.live += 1;

        let slot = Slot {
            generation,
            entry: Some(cursor),
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        };
        CursorId { index, generation }
    }

    /// Remove `id`. Returns false for a stale or already removed handle.
    pub(crate) fn remove(&mut self, id: CursorId) -> bool {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.entry.is_some() => {
                slot.entry = None;
                self.free.push(id.index);
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn contains(&self, id: CursorId) -> bool {
        self.slot(id).is_some()
    }

    /// Every registered cursor that is still alive.
    pub(crate) fn live(&self) -> Vec<Arc<T>> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn slot(&self, id: CursorId) -> Option<&Weak<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }
}
