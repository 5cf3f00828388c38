//! regatta-store — versioned KV client layer for the Regatta registry.
//!
//! Wraps a doozer-style revision-versioned hierarchical KV store
//! behind three small abstractions:
//!
//! - [`Backend`] — the transport seam: linearizable revisions,
//!   compare-and-set writes, globbed blocking waits. [`MemBackend`] is
//!   the embedded single-node implementation.
//! - [`Snapshot`] — an immutable handle pinned to one revision; every
//!   successful write returns a new snapshot at the post-write
//!   revision, so read-your-writes is structural.
//! - [`Dir`] — a path prefix treated as a record with named fields.
//!
//! The registry crate builds its entity model on top of these.

pub mod backend;
pub mod dir;
pub mod error;
pub mod mem;
pub mod snapshot;
pub mod uri;

pub use backend::{Backend, MutationKind, PathInfo, RawEvent};
pub use dir::Dir;
pub use error::{StoreError, StoreResult};
pub use mem::MemBackend;
pub use snapshot::{Conn, Snapshot};
pub use uri::{dial_backend, dial_uri, ClusterUri, DEFAULT_ROOT, DEFAULT_URI};
