// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for the VeriSimDB key-value bridge.
//
// Two layers: `EngineError` is the status an ordered key-value engine reports
// from a blocking call, and `KvError` is what callers receive through a
// completion. Engine messages are carried into `KvError` verbatim so the
// caller sees exactly what the engine said.

use thiserror::Error;

/// Status reported by an ordered key-value engine.
///
/// A missing key is not an error at this level: engines return `Ok(None)`
/// from `get`, and the database turns that into [`KvError::NotFound`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored data is corrupted or in an unexpected format.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// The engine rejected its arguments (e.g. `errorIfExists` on an
    /// existing store, or a missing store without `createIfMissing`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine is not available (lock held by another handle, closed).
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Misuse of a database or cursor relative to its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The database is not open (never opened, closed, or still opening).
    #[error("database is not open")]
    NotOpen,

    /// `open` was called on a database that is open or opening.
    #[error("database is already open")]
    AlreadyOpen,

    /// A close is already pending or running.
    #[error("database is closing")]
    Closing,

    /// The cursor has been ended.
    #[error("cursor has ended")]
    CursorEnded,

    /// The cursor already has an advance in flight.
    #[error("cursor already has an advance in flight")]
    AdvanceInFlight,
}

/// Errors delivered to callers of the key-value bridge.
#[derive(Debug, Error)]
pub enum KvError {
    /// Options could not be parsed from the host configuration object.
    #[error("invalid options: {0}")]
    Config(String),

    /// The engine refused to open.
    #[error("open failed: {0}")]
    Open(String),

    /// `get` on a key that does not exist.
    #[error("NotFound: key not found in database")]
    NotFound,

    /// Any other engine failure, message carried verbatim.
    #[error("{0}")]
    Storage(String),

    /// Operation not valid in the current database or cursor state.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The blocking section of a task panicked.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The runtime dropped the task before it could complete.
    #[error("task was cancelled before completing")]
    Cancelled,

    /// No tokio runtime was available to run tasks on.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<EngineError> for KvError {
    fn from(err: EngineError) -> Self {
        KvError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Config(err.to_string())
    }
}

impl KvError {
    /// True for [`KvError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }
}

/// Convenience type alias for key-value results.
pub type KvResult<T> = Result<T, KvError>;
