// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Task execution for the key-value bridge.
//
// Every operation a caller issues becomes one `Task`: an `Operation` payload,
// the database it runs against, and a one-shot reply channel. The driver runs
// the blocking half (`execute`) on tokio's blocking pool, then the completion
// half (`complete`) back on an async worker, where the operation's hook
// updates database and cursor state before the single reply is sent.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::cursor::CursorShared;
use crate::database::DbShared;
use crate::datum::{Batch, Datum};
use crate::engine::Engine;
use crate::error::{KvError, KvResult};
use crate::options::{EngineResources, GetOptions, OpenOptions, WriteOptions};

/// Lock a coordination mutex, recovering the guard if a task panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The closed set of operations a task can carry.
pub(crate) enum Operation<E: Engine> {
    Open {
        location: PathBuf,
        options: OpenOptions,
        resources: EngineResources,
    },
    Close,
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        options: WriteOptions,
    },
    Get {
        key: Vec<u8>,
        options: GetOptions,
    },
    Delete {
        key: Vec<u8>,
        options: WriteOptions,
    },
    Advance {
        cursor: Arc<CursorShared<E>>,
    },
    End {
        cursor: Arc<CursorShared<E>>,
    },
}

impl<E: Engine> Operation<E> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Operation::Open { .. } => "kv.db.open",
            Operation::Close => "kv.db.close",
            Operation::Put { .. } => "kv.db.put",
            Operation::Get { .. } => "kv.db.get",
            Operation::Delete { .. } => "kv.db.delete",
            Operation::Advance { .. } => "kv.cursor.advance",
            Operation::End { .. } => "kv.cursor.end",
        }
    }
}

/// What a successful task hands back.
#[derive(Debug)]
pub(crate) enum Outcome {
    Done,
    Value(Datum),
    Batch(Batch),
}

impl Outcome {
    pub(crate) fn into_unit(self) -> KvResult<()> {
        match self {
            Outcome::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub(crate) fn into_value(self) -> KvResult<Datum> {
        match self {
            Outcome::Value(datum) => Ok(datum),
            other => Err(unexpected(other)),
        }
    }

    pub(crate) fn into_batch(self) -> KvResult<Batch> {
        match self {
            Outcome::Batch(batch) => Ok(batch),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(outcome: Outcome) -> KvError {
    KvError::TaskFailed(format!("unexpected outcome: {:?}", outcome))
}

pub(crate) type Reply = oneshot::Sender<KvResult<Outcome>>;

/// One queued unit of work.
pub(crate) struct Task<E: Engine> {
    db: Arc<DbShared<E>>,
    op: Operation<E>,
    reply: Reply,
}

impl<E: Engine> Task<E> {
    pub(crate) fn new(db: Arc<DbShared<E>>, op: Operation<E>, reply: Reply) -> Self {
        Self { db, op, reply }
    }

    /// Blocking half. Runs on the blocking pool and may touch the engine.
    fn execute(&self) -> KvResult<Outcome> {
        match &self.op {
            Operation::Open {
                location,
                options,
                resources,
            } => {
                let engine = E::open(location, options, resources)
                    .map_err(|err| KvError::Open(err.to_string()))?;
                debug!(engine = engine.name(), location = %location.display(), "engine opened");
                self.db.install(engine);
                Ok(Outcome::Done)
            }
            Operation::Close => {
                self.db.teardown();
                Ok(Outcome::Done)
            }
            Operation::Put {
                key,
                value,
                options,
            } => {
                self.db.engine()?.put(key, value, options)?;
                Ok(Outcome::Done)
            }
            Operation::Get { key, options } => {
                let found = self.db.engine()?.get(key, &options.read_options())?;
                let bytes = found.ok_or(KvError::NotFound)?;
                Ok(Outcome::Value(Datum::new(bytes, options.as_buffer)))
            }
            Operation::Delete { key, options } => {
                self.db.engine()?.delete(key, options)?;
                Ok(Outcome::Done)
            }
            Operation::Advance { cursor } => cursor.next_batch().map(Outcome::Batch),
            Operation::End { cursor } => {
                cursor.teardown();
                Ok(Outcome::Done)
            }
        }
    }

    /// Completion half. Applies the operation's hook, then delivers the
    /// result. Hooks run even when nobody is waiting for the reply.
    fn complete(self, result: KvResult<Outcome>) {
        let Task { db, op, reply } = self;
        let name = op.name();

        match op {
            Operation::Open { .. } => {
                db.finish_open(result.is_ok());
                send(name, reply, result);
            }
            Operation::Close => {
                db.finish_close();
                send(name, reply, result);
            }
            Operation::Advance { cursor } => {
                let pending_end = cursor.finish_advance();
                send(name, reply, result);
                if let Some(end_reply) = pending_end {
                    debug!(cursor = %cursor.id(), "running deferred end");
                    let driver = db.driver.clone();
                    driver.queue(Task::new(db, Operation::End { cursor }, end_reply));
                }
            }
            Operation::End { cursor } => {
                let pending_close = db.release_cursor(cursor.id());
                send(name, reply, result);
                if let Some(close_reply) = pending_close {
                    debug!("last cursor ended, running deferred close");
                    let driver = db.driver.clone();
                    driver.queue(Task::new(db, Operation::Close, close_reply));
                }
            }
            Operation::Put { .. } | Operation::Get { .. } | Operation::Delete { .. } => {
                send(name, reply, result);
            }
        }
    }
}

pub(crate) fn send(name: &'static str, reply: Reply, result: KvResult<Outcome>) {
    if reply.send(result).is_err() {
        trace!(task = name, "receiver dropped, result discarded");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Runs tasks on a tokio runtime: blocking half on the blocking pool,
/// completion half on an async worker.
#[derive(Debug, Clone)]
pub(crate) struct TaskDriver {
    runtime: Handle,
}

impl TaskDriver {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub(crate) fn queue<E: Engine>(&self, task: Task<E>) {
        let name = task.op.name();
        trace!(task = name, "queued");

        self.runtime.spawn(async move {
            let joined = tokio::task::spawn_blocking(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| task.execute()))
                    .unwrap_or_else(|payload| {
                        let msg = panic_message(payload.as_ref());
                        warn!(task = name, panic = %msg, "task panicked");
                        Err(KvError::TaskFailed(msg))
                    });
                (task, result)
            })
            .await;

            match joined {
                Ok((task, result)) => {
                    trace!(task = name, ok = result.is_ok(), "completing");
                    task.complete(result);
                }
                Err(err) => warn!(task = name, error = %err, "task lost before completing"),
            }
        });
    }
}

enum State<T> {
    Pending {
        rx: oneshot::Receiver<KvResult<Outcome>>,
        extract: fn(Outcome) -> KvResult<T>,
    },
    Ready(Option<KvResult<T>>),
}

/// The caller's side of a task: resolves exactly once with the task's result.
///
/// The task is already queued when a `Completion` is handed out; dropping it
/// does not cancel the work, only discards the result.
#[must_use = "dropping a Completion discards the result but does not cancel the operation"]
pub struct Completion<T> {
    state: State<T>,
}

impl<T> Completion<T> {
    pub(crate) fn ready(result: KvResult<T>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    pub(crate) fn failed(err: impl Into<KvError>) -> Self {
        Self::ready(Err(err.into()))
    }
}

/// A fresh reply channel and the completion waiting on it.
pub(crate) fn channel<T>(extract: fn(Outcome) -> KvResult<T>) -> (Reply, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    let completion = Completion {
        state: State::Pending { rx, extract },
    };
    (tx, completion)
}

impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
    type Output = KvResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(KvError::Cancelled))),
            State::Pending { rx, extract } => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result.and_then(*extract)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(KvError::Cancelled)),
            },
        }
    }
}
