//! Error kinds surfaced by the engine's internal operations.
//!
//! The public query surface (`Table::insert`, `select`, `update`, ...) never
//! returns `EngineError` directly -- it collapses every variant into the
//! boolean/empty-on-failure contract described by the spec, logging the
//! underlying cause first. `EngineError` is what the internal `try_*`
//! methods and the persistence/buffer-pool layers use to propagate the
//! specific failure up to that boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("primary key already exists")]
    DuplicateKey,

    #[error("record not found")]
    NotFound,

    #[error("lock conflict acquiring {0} lock")]
    LockConflict(&'static str),

    #[error("update arity mismatch: expected {expected} columns, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("range is empty")]
    RangeEmpty,

    #[error("physical page is full")]
    PageFull,

    #[error("invalid column index {0}")]
    InvalidColumn(usize),

    #[error("slot {0} is out of bounds")]
    OffsetOutOfBounds(usize),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt on-disk state: {0}")]
    CorruptState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
