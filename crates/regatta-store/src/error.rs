//! Error types for the store layer.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the versioned KV layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The path is absent at the read revision.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A compare-and-set write lost the race. The caller must refresh
    /// its snapshot and decide whether to retry; the library never
    /// retries on its own.
    #[error("revision mismatch on {path}")]
    RevisionMismatch { path: String },

    /// The connection was closed; pending waits return this.
    #[error("connection closed")]
    Closed,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid glob: {0}")]
    BadGlob(String),

    #[error("invalid connection uri: {0}")]
    InvalidUri(String),

    /// The URI scheme is recognised but no transport for it is linked
    /// into this build. Callers supply one via `dial_backend`.
    #[error("no transport for scheme {0:?}")]
    NoTransport(String),
}

impl StoreError {
    /// True for lookup misses, as opposed to I/O or conflict failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound(_))
    }

    /// True when a compare-and-set write was beaten by a concurrent writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionMismatch { .. })
    }
}
