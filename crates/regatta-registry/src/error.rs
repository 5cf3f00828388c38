//! Domain error taxonomy.
//!
//! Grammar and validation failures are raised before any KV write.
//! Compare-and-set conflicts bubble up from the store layer untouched;
//! the caller owns retry policy.

use regatta_store::StoreError;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry.
#[derive(Debug, Error)]
pub enum Error {
    /// Store-layer failure, including `KeyNotFound` and the
    /// `RevisionMismatch` conflict a stale snapshot produces.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid name {0:?}: must match [A-Za-z0-9.-]+")]
    InvalidName(String),

    /// Proc names are stricter than the general grammar: strictly
    /// alphanumeric, no separators at all.
    #[error("invalid proc name {0:?}: must be alphanumeric")]
    BadProcName(String),

    #[error("invalid traffic-control share {0}: must be within [0, 100]")]
    InvalidShare(i64),

    #[error("{kind} {id} already registered")]
    AlreadyRegistered { kind: &'static str, id: String },

    #[error("app {0:?} not found")]
    AppNotFound(String),

    #[error("revision {rev:?} not found for app {app}")]
    RevisionNotFound { app: String, rev: String },

    #[error("proc {proc:?} not found for app {app}")]
    ProcNotFound { app: String, proc: String },

    #[error("instance {0} not found")]
    InstanceNotFound(i64),

    #[error("service {0:?} not found")]
    ServiceNotFound(String),

    #[error("endpoint {id:?} not found for service {service}")]
    EndpointNotFound { service: String, id: String },

    /// An operation was applied in a state the lifecycle diagram does
    /// not allow (e.g. claiming a non-pending instance).
    #[error("instance {id} is {status}, expected {expected}")]
    InvalidState {
        id: i64,
        status: &'static str,
        expected: &'static str,
    },

    /// A host tried to drive a transition on an instance it never
    /// claimed.
    #[error("host {host:?} holds no claim on instance {id}")]
    NotClaimer { id: i64, host: String },

    #[error("insufficient running instances to satisfy the scaling request")]
    InsufficientInstances,

    /// A stored record failed to parse back.
    #[error("malformed record at {path}: {detail}")]
    BadRecord { path: String, detail: String },

    /// Enriching a raw watch event failed; carries the offending
    /// event's coordinates.
    #[error("enriching event at rev {rev} ({path}): {source}")]
    Enrichment {
        path: String,
        rev: i64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True when a compare-and-set write was beaten and the caller
    /// should refresh its snapshot before deciding to retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_conflict())
    }
}
