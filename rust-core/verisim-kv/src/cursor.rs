// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Range cursors.
//
// A cursor reads a snapshot taken when it was created. The engine iterator is
// created and positioned lazily on the first advance, then each advance
// collects entries until the batch passes the high-water mark or the range
// runs out. At most one advance is in flight per cursor; an end requested
// during an advance runs right after that advance has delivered its batch.

use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::database::DbShared;
use crate::datum::{Batch, Datum, Entry};
use crate::engine::{Engine, EngineIterator, EngineSnapshot};
use crate::error::{KvError, KvResult, LifecycleError};
use crate::options::{CursorOptions, ReadOptions};
use crate::range::Range;
use crate::registry::CursorId;
use crate::task::{self, lock, Completion, Operation, Outcome, Reply, Task};

type IterOf<E> = <<E as Engine>::Snapshot as EngineSnapshot>::Iter;

#[derive(Default)]
struct Control {
    nexting: bool,
    ended: bool,
    pending_end: Option<Reply>,
}

struct Scan<E: Engine> {
    range: Range,
    keys: bool,
    values: bool,
    key_as_buffer: bool,
    value_as_buffer: bool,
    high_water_mark: usize,
    eager_first_result: bool,
    read_options: ReadOptions,
    snapshot: Option<E::Snapshot>,
    iter: Option<IterOf<E>>,
    /// Entries seen so far, counted against `range.limit`.
    count: u64,
    /// The iterator was just repositioned; the next read must not step.
    seeking: bool,
    /// The first entry of the cursor (or of the last seek) was delivered.
    landed: bool,
    exhausted: bool,
}

impl<E: Engine> Scan<E> {
    fn new(snapshot: E::Snapshot, options: &CursorOptions) -> Self {
        Self {
            range: Range::from_options(options),
            keys: options.keys,
            values: options.values,
            key_as_buffer: options.key_as_buffer,
            value_as_buffer: options.value_as_buffer,
            high_water_mark: options.high_water_mark,
            eager_first_result: options.eager_first_result,
            read_options: options.read_options(),
            snapshot: Some(snapshot),
            iter: None,
            count: 0,
            seeking: false,
            landed: false,
            exhausted: false,
        }
    }

    fn open_iter(&self) -> KvResult<IterOf<E>> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(LifecycleError::CursorEnded)?;
        Ok(snapshot.iter(&self.read_options)?)
    }

    /// Create and position the iterator if this is the first read.
    /// Returns true when it did.
    fn position(&mut self) -> KvResult<bool> {
        if self.iter.is_some() {
            return Ok(false);
        }

        let mut iter = self.open_iter()?;
        let reverse = self.range.reverse;
        match self.range.effective_start() {
            None if reverse => iter.seek_to_last(),
            None => iter.seek_to_first(),
            Some(start) => {
                iter.seek(start);
                if reverse {
                    if !iter.valid() {
                        iter.seek_to_last();
                    } else if self.range.overshoots_upper(iter.key()) {
                        iter.prev();
                    }
                } else if iter.valid() && self.range.sits_on_lower(iter.key()) {
                    iter.next();
                }
            }
        }
        self.iter = Some(iter);
        Ok(true)
    }

    /// Next in-range entry and its raw key+value size, or `None` once the
    /// range, the limit or the snapshot is exhausted.
    fn read(&mut self) -> KvResult<Option<(Entry, usize)>> {
        let fresh = self.position()?;
        let Some(iter) = self.iter.as_mut() else {
            return Ok(None);
        };

        if !fresh && !self.seeking && iter.valid() {
            if self.range.reverse {
                iter.prev();
            } else {
                iter.next();
            }
        }
        self.seeking = false;

        if !iter.valid() {
            return Ok(None);
        }

        if let Some(limit) = self.range.limit {
            self.count += 1;
            if self.count > limit {
                return Ok(None);
            }
        }

        let key = iter.key();
        if !self.range.contains(key) {
            return Ok(None);
        }

        let value = iter.value();
        let size = key.len() + value.len();
        let entry = Entry {
            key: self.keys.then(|| Datum::new(key.to_vec(), self.key_as_buffer)),
            value: self
                .values
                .then(|| Datum::new(value.to_vec(), self.value_as_buffer)),
        };
        Ok(Some((entry, size)))
    }

    fn next_batch(&mut self) -> KvResult<Batch> {
        let mut batch = Batch::default();
        if self.exhausted {
            batch.finished = true;
            return Ok(batch);
        }

        let mut size = 0;
        while let Some((entry, bytes)) = self.read()? {
            batch.entries.push(entry);
            size += bytes;

            if !self.landed {
                self.landed = true;
                if self.eager_first_result {
                    return Ok(batch);
                }
            }
            if size > self.high_water_mark {
                return Ok(batch);
            }
        }

        self.exhausted = true;
        if let Some(iter) = &self.iter {
            iter.status().map_err(|err| KvError::Storage(err.to_string()))?;
        }
        batch.finished = true;
        Ok(batch)
    }

    fn seek(&mut self, target: &[u8]) -> KvResult<()> {
        if self.iter.is_none() {
            self.iter = Some(self.open_iter()?);
        }
        let reverse = self.range.reverse;
        if let Some(iter) = self.iter.as_mut() {
            iter.seek(target);
            if reverse {
                if !iter.valid() {
                    iter.seek_to_last();
                } else if iter.key() > target {
                    iter.prev();
                }
            }
        }
        self.seeking = true;
        self.landed = false;
        self.exhausted = false;
        Ok(())
    }

    /// Release the iterator before the snapshot it reads from.
    fn release(&mut self) {
        self.iter = None;
        self.snapshot = None;
    }
}

/// Cursor state shared with in-flight tasks and the database registry.
pub(crate) struct CursorShared<E: Engine> {
    id: CursorId,
    db: Weak<DbShared<E>>,
    control: Mutex<Control>,
    scan: Mutex<Scan<E>>,
}

impl<E: Engine> CursorShared<E> {
    pub(crate) fn new(
        id: CursorId,
        db: Weak<DbShared<E>>,
        snapshot: E::Snapshot,
        options: &CursorOptions,
    ) -> Self {
        Self {
            id,
            db,
            control: Mutex::new(Control::default()),
            scan: Mutex::new(Scan::new(snapshot, options)),
        }
    }

    pub(crate) fn id(&self) -> CursorId {
        self.id
    }

    pub(crate) fn next_batch(&self) -> KvResult<Batch> {
        lock(&self.scan).next_batch()
    }

    pub(crate) fn teardown(&self) {
        lock(&self.scan).release();
        debug!(cursor = %self.id, "cursor released its snapshot");
    }

    /// Clear the in-flight flag after an advance and hand back an end that
    /// was requested meanwhile.
    pub(crate) fn finish_advance(&self) -> Option<Reply> {
        let mut control = lock(&self.control);
        control.nexting = false;
        control.pending_end.take()
    }

    pub(crate) fn is_ended(&self) -> bool {
        lock(&self.control).ended
    }

    fn advance(self: &Arc<Self>) -> Completion<Batch> {
        let mut control = lock(&self.control);
        if control.ended {
            return Completion::failed(LifecycleError::CursorEnded);
        }
        if control.nexting {
            return Completion::failed(LifecycleError::AdvanceInFlight);
        }
        let Some(db) = self.db.upgrade() else {
            return Completion::failed(LifecycleError::NotOpen);
        };
        control.nexting = true;
        drop(control);

        let (reply, completion) = task::channel(Outcome::into_batch);
        let driver = db.driver.clone();
        driver.queue(Task::new(
            db,
            Operation::Advance {
                cursor: Arc::clone(self),
            },
            reply,
        ));
        completion
    }

    pub(crate) fn end(self: &Arc<Self>) -> Completion<()> {
        let mut control = lock(&self.control);
        if control.ended {
            return Completion::ready(Ok(()));
        }
        control.ended = true;

        let (reply, completion) = task::channel(Outcome::into_unit);
        if control.nexting {
            debug!(cursor = %self.id, "end deferred until advance completes");
            control.pending_end = Some(reply);
            return completion;
        }
        drop(control);

        match self.db.upgrade() {
            Some(db) => {
                let driver = db.driver.clone();
                driver.queue(Task::new(
                    db,
                    Operation::End {
                        cursor: Arc::clone(self),
                    },
                    reply,
                ));
            }
            None => {
                self.teardown();
                task::send("kv.cursor.end", reply, Ok(Outcome::Done));
            }
        }
        completion
    }

    fn seek(&self, target: &[u8]) -> KvResult<()> {
        let control = lock(&self.control);
        if control.ended {
            return Err(LifecycleError::CursorEnded.into());
        }
        if control.nexting {
            return Err(LifecycleError::AdvanceInFlight.into());
        }
        let mut scan = lock(&self.scan);
        drop(control);
        scan.seek(target)
    }
}

/// A range scan over a database snapshot.
///
/// Dropping a cursor that was never ended ends it in the background, so an
/// abandoned cursor does not hold up `close`.
pub struct Cursor<E: Engine> {
    shared: Arc<CursorShared<E>>,
}

impl<E: Engine> Cursor<E> {
    pub(crate) fn new(shared: Arc<CursorShared<E>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> CursorId {
        self.shared.id()
    }

    /// Fetch the next batch of entries.
    ///
    /// The advance is queued before this returns. Calling it again before
    /// the batch arrives fails with `AdvanceInFlight`; calling it after
    /// `end` fails with `CursorEnded`. Once the range is exhausted every
    /// further advance resolves to an empty, finished batch.
    pub fn advance(&self) -> Completion<Batch> {
        self.shared.advance()
    }

    /// End the cursor and release its snapshot.
    ///
    /// Safe to call while an advance is in flight: the advance still
    /// delivers its batch, and the end completes after it. Ending twice is
    /// a no-op.
    pub fn end(&self) -> Completion<()> {
        self.shared.end()
    }

    /// Reposition the cursor. Forward cursors land on the first key
    /// `>= target`, reverse ones on the last key `<= target`. Range bounds
    /// still apply to what the next advance returns.
    pub fn seek(&self, target: impl AsRef<[u8]>) -> KvResult<()> {
        self.shared.seek(target.as_ref())
    }

    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }
}

impl<E: Engine> std::fmt::Debug for Cursor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.shared.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl<E: Engine> Drop for Cursor<E> {
    fn drop(&mut self) {
        if !self.shared.is_ended() {
            debug!(cursor = %self.shared.id, "cursor dropped without end");
            drop(self.shared.end());
        }
    }
}
