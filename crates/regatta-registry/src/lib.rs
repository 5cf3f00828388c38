//! regatta-registry — the coordination registry data model.
//!
//! Models an application fleet — apps, code revisions, proc types,
//! services, endpoints and running instances — as durable state in a
//! revision-versioned hierarchical KV store, and derives a typed event
//! stream from the raw mutations.
//!
//! # Architecture
//!
//! - **`paths`** — the one authoritative path codec and classification
//!   table shared by writers and the watcher
//! - **entities** (`app`, `revision`, `proc`, `service`, `endpoint`,
//!   `instance`) — immutable snapshot-bound values; every mutation
//!   returns a new value pinned to the post-write revision
//! - **`instance`** — the lifecycle state machine and its
//!   claim/start/stop tickets
//! - **`event`** — the watch & enrichment pipeline
//! - **`store`** — the connection façade, bootstrap and scaling
//!
//! Concurrency control is optimistic throughout: no in-process locks,
//! every mutation is a compare-and-set on the store, and conflicts are
//! surfaced to the caller rather than retried.

pub mod app;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod instance;
pub mod paths;
pub mod proc;
pub mod revision;
pub mod service;
pub mod store;

pub use app::App;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use event::{Event, EventType, PathData, Source};
pub use instance::{InsStatus, Instance};
pub use proc::{Limits, Proc, ProcAttrs, TrafficControl};
pub use revision::Revision;
pub use service::Service;
pub use store::{ScaleOutcome, Store, DEFAULT_ENV};

pub use regatta_store::{StoreError, DEFAULT_ROOT, DEFAULT_URI};
