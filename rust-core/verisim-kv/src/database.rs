// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Database handle.
//
// Owns the engine between open and close, the resources allocated for it,
// and the registry of live cursors. A close requested while cursors are
// still registered is parked and runs once the last of them has ended.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::debug;

use crate::cursor::{Cursor, CursorShared};
use crate::datum::Datum;
use crate::engine::Engine;
use crate::error::{KvError, KvResult, LifecycleError};
use crate::memory::MemoryEngine;
use crate::options::{CursorOptions, EngineResources, GetOptions, OpenOptions, WriteOptions};
use crate::registry::{CursorId, CursorRegistry};
use crate::task::{self, lock, Completion, Operation, Outcome, Reply, Task, TaskDriver};

/// Lifecycle of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Closed,
    Opening,
    Open,
    Closing,
}

pub(crate) struct DbState<E: Engine> {
    status: Status,
    cursors: CursorRegistry<CursorShared<E>>,
    pending_close: Option<Reply>,
}

/// State shared between the handle, in-flight tasks and cursors.
pub(crate) struct DbShared<E: Engine> {
    pub(crate) driver: TaskDriver,
    engine: Mutex<Option<Arc<E>>>,
    resources: Mutex<Option<EngineResources>>,
    state: Mutex<DbState<E>>,
}

impl<E: Engine> DbShared<E> {
    /// The open engine, or `NotOpen` once it has been closed.
    pub(crate) fn engine(&self) -> KvResult<Arc<E>> {
        lock(&self.engine)
            .clone()
            .ok_or_else(|| LifecycleError::NotOpen.into())
    }

    pub(crate) fn install(&self, engine: E) {
        *lock(&self.engine) = Some(Arc::new(engine));
    }

    /// Drop the engine handle and its resources. In-flight tasks holding a
    /// clone of the handle finish first.
    pub(crate) fn teardown(&self) {
        let engine = lock(&self.engine).take();
        let resources = lock(&self.resources).take();
        if let Some(engine) = &engine {
            debug!(
                engine = engine.name(),
                cache_bytes = resources.as_ref().map(|r| r.cache.capacity()),
                "engine closed"
            );
        }
    }

    pub(crate) fn finish_open(&self, ok: bool) {
        let mut state = lock(&self.state);
        if ok {
            state.status = Status::Open;
        } else {
            state.status = Status::Closed;
            drop(state);
            lock(&self.resources).take();
        }
    }

    pub(crate) fn finish_close(&self) {
        lock(&self.state).status = Status::Closed;
    }

    /// Deregister an ended cursor. Returns the parked close reply when this
    /// was the last cursor a pending close was waiting for.
    pub(crate) fn release_cursor(&self, id: CursorId) -> Option<Reply> {
        let mut state = lock(&self.state);
        if state.cursors.remove(id) {
            debug!(cursor = %id, remaining = state.cursors.len(), "cursor released");
        }
        if state.cursors.is_empty() {
            state.pending_close.take()
        } else {
            None
        }
    }
}

/// Handle to an ordered key-value store.
///
/// Every storage operation returns a [`Completion`] and runs on the tokio
/// blocking pool. Handles are cheap to clone and share one underlying store.
///
/// # Example
///
/// ```rust
/// use verisim_kv::{CursorOptions, Database, GetOptions, OpenOptions, WriteOptions};
///
/// # tokio_test::block_on(async {
/// let db: Database = Database::new().unwrap();
/// db.open("scratch", OpenOptions::default()).await.unwrap();
///
/// db.put("a", "1", WriteOptions::default()).await.unwrap();
/// db.put("b", "2", WriteOptions::default()).await.unwrap();
/// assert_eq!(db.get("a", GetOptions::default()).await.unwrap().as_bytes(), b"1");
///
/// let cursor = db.cursor(CursorOptions::new().gte("b")).unwrap();
/// let batch = cursor.advance().await.unwrap();
/// assert_eq!(batch.keys(), vec![b"b".to_vec()]);
/// assert!(batch.finished);
/// cursor.end().await.unwrap();
///
/// db.close().await.unwrap();
/// # });
/// ```
pub struct Database<E: Engine = MemoryEngine> {
    shared: Arc<DbShared<E>>,
}

impl<E: Engine> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Engine> fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("status", &self.status())
            .field("open_cursors", &self.open_cursors())
            .finish()
    }
}

impl<E: Engine> Database<E> {
    /// Create a closed database that runs its tasks on the current tokio
    /// runtime.
    pub fn new() -> KvResult<Self> {
        let runtime = Handle::try_current().map_err(|e| KvError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(runtime))
    }

    /// Create a closed database that runs its tasks on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            shared: Arc::new(DbShared {
                driver: TaskDriver::new(runtime),
                engine: Mutex::new(None),
                resources: Mutex::new(None),
                state: Mutex::new(DbState {
                    status: Status::Closed,
                    cursors: CursorRegistry::default(),
                    pending_close: None,
                }),
            }),
        }
    }

    /// Open the store at `location`.
    ///
    /// The block cache and filter policy are allocated before the task is
    /// queued and belong to the database until close. A failed open leaves
    /// the database closed, so it may be retried.
    pub fn open(&self, location: impl AsRef<Path>, options: OpenOptions) -> Completion<()> {
        {
            let mut state = lock(&self.shared.state);
            match state.status {
                Status::Closed => state.status = Status::Opening,
                Status::Closing => return Completion::failed(LifecycleError::Closing),
                Status::Opening | Status::Open => {
                    return Completion::failed(LifecycleError::AlreadyOpen)
                }
            }
        }

        let location = location.as_ref().to_path_buf();
        let resources = EngineResources::from_options(&options);
        *lock(&self.shared.resources) = Some(resources.clone());
        debug!(
            location = %location.display(),
            cache_size = options.cache_size,
            create_if_missing = options.create_if_missing,
            error_if_exists = options.error_if_exists,
            "opening database"
        );

        self.submit(
            Operation::Open {
                location,
                options,
                resources,
            },
            Outcome::into_unit,
        )
    }

    /// Close the store.
    ///
    /// With no open cursors the close task is queued at once. Otherwise it
    /// waits until every cursor has ended; the returned completion resolves
    /// after the engine is released either way.
    pub fn close(&self) -> Completion<()> {
        let mut state = lock(&self.shared.state);
        match state.status {
            Status::Open => state.status = Status::Closing,
            Status::Closing => return Completion::failed(LifecycleError::Closing),
            Status::Closed | Status::Opening => {
                return Completion::failed(LifecycleError::NotOpen)
            }
        }

        let (reply, completion) = task::channel(Outcome::into_unit);
        if state.cursors.is_empty() {
            drop(state);
            self.queue(Operation::Close, reply);
        } else {
            debug!(
                open_cursors = state.cursors.len(),
                "close deferred until cursors end"
            );
            state.pending_close = Some(reply);
        }
        completion
    }

    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        options: WriteOptions,
    ) -> Completion<()> {
        self.submit(
            Operation::Put {
                key: key.into(),
                value: value.into(),
                options,
            },
            Outcome::into_unit,
        )
    }

    /// Fetch the value stored under `key`. A missing key resolves to
    /// [`KvError::NotFound`].
    pub fn get(&self, key: impl Into<Vec<u8>>, options: GetOptions) -> Completion<Datum> {
        self.submit(
            Operation::Get {
                key: key.into(),
                options,
            },
            Outcome::into_value,
        )
    }

    pub fn delete(&self, key: impl Into<Vec<u8>>, options: WriteOptions) -> Completion<()> {
        self.submit(
            Operation::Delete {
                key: key.into(),
                options,
            },
            Outcome::into_unit,
        )
    }

    /// Create a cursor over a snapshot taken now.
    ///
    /// Writes made after this call are not visible to the cursor. The cursor
    /// holds up any later `close` until it is ended or dropped.
    pub fn cursor(&self, options: CursorOptions) -> KvResult<Cursor<E>> {
        let mut state = lock(&self.shared.state);
        match state.status {
            Status::Open => {}
            Status::Closing => return Err(LifecycleError::Closing.into()),
            Status::Closed | Status::Opening => return Err(LifecycleError::NotOpen.into()),
        }

        let snapshot = self.shared.engine()?.snapshot()?;
        let db = Arc::downgrade(&self.shared);
        let cursor = Arc::new_cyclic(|weak| {
            let id = state.cursors.insert(weak.clone());
            CursorShared::new(id, db, snapshot, &options)
        });
        debug!(
            cursor = %cursor.id(),
            reverse = options.reverse,
            open_cursors = state.cursors.len(),
            "cursor created"
        );
        Ok(Cursor::new(cursor))
    }

    /// End every cursor that is still open and return how many this call
    /// ended. Advances already in flight deliver their batches first, and a
    /// pending close runs once the last end completes.
    pub fn end_cursors(&self) -> usize {
        let cursors = lock(&self.shared.state).cursors.live();
        let mut ended = 0;
        for cursor in cursors {
            if !cursor.is_ended() {
                drop(cursor.end());
                ended += 1;
            }
        }
        if ended > 0 {
            debug!(ended, "ended open cursors");
        }
        ended
    }

    pub fn status(&self) -> Status {
        lock(&self.shared.state).status
    }

    /// The open engine, for engine-specific inspection.
    pub fn engine(&self) -> Option<Arc<E>> {
        lock(&self.shared.engine).clone()
    }

    /// Resources allocated for the engine, held from `open` until close.
    pub fn resources(&self) -> Option<EngineResources> {
        lock(&self.shared.resources).clone()
    }

    /// Number of cursors that have not yet finished ending.
    pub fn open_cursors(&self) -> usize {
        lock(&self.shared.state).cursors.len()
    }

    pub fn is_cursor_live(&self, id: CursorId) -> bool {
        lock(&self.shared.state).cursors.contains(id)
    }

    fn submit<T>(&self, op: Operation<E>, extract: fn(Outcome) -> KvResult<T>) -> Completion<T> {
        let (reply, completion) = task::channel(extract);
        self.queue(op, reply);
        completion
    }

    fn queue(&self, op: Operation<E>, reply: Reply) {
        let task = Task::new(Arc::clone(&self.shared), op, reply);
        self.shared.driver.queue(task);
    }
}
