//! The backend interface — what a versioned KV store must provide.
//!
//! The registry is written against this trait, not against a concrete
//! transport. The embedded [`MemBackend`](crate::MemBackend) implements
//! it in-process; a replicated doozer-style transport plugs in behind
//! the same seam.
//!
//! Semantics every implementation must honour:
//!
//! - revisions are global, monotonic, and assigned per mutation;
//! - reads at a revision are linearizable (historical consistency);
//! - `set`/`del` are compare-and-set: they fail with
//!   [`StoreError::RevisionMismatch`] iff the path was mutated after
//!   the caller's revision;
//! - `wait` blocks for the first mutation at or after `from_rev`
//!   matching the glob, and mutations are observed in revision order.

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Whether a mutation wrote a body or removed the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Set,
    Del,
}

/// A raw path-level mutation as observed by `wait`.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Absolute path of the mutated file.
    pub path: String,
    /// New body for `Set`, empty for `Del`.
    pub body: String,
    /// Revision the mutation was committed at.
    pub rev: i64,
    pub kind: MutationKind,
}

impl RawEvent {
    pub fn is_set(&self) -> bool {
        self.kind == MutationKind::Set
    }

    pub fn is_del(&self) -> bool {
        self.kind == MutationKind::Del
    }
}

/// Existence and shape of a path at some revision.
///
/// `rev == 0` means the path does not exist (doozer convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfo {
    pub rev: i64,
    pub is_dir: bool,
}

impl PathInfo {
    pub fn exists(&self) -> bool {
        self.rev != 0
    }
}

/// A versioned, hierarchical KV store.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The latest committed revision.
    async fn rev(&self) -> StoreResult<i64>;

    /// Read a file at `rev` (latest when `None`). Returns the body and
    /// the revision the file was last written at.
    async fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(String, i64)>;

    /// Compare-and-set write. Succeeds iff `path` has not been mutated
    /// after `rev`; returns the post-write revision.
    async fn set(&self, path: &str, rev: i64, body: &str) -> StoreResult<i64>;

    /// Compare-and-set delete. `KeyNotFound` if the path is already
    /// absent; returns the post-delete revision.
    async fn del(&self, path: &str, rev: i64) -> StoreResult<i64>;

    /// Names of the live direct children of `path` at `rev`, sorted.
    /// An empty or missing directory yields an empty list.
    async fn getdir(
        &self,
        path: &str,
        rev: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>>;

    /// Existence and shape of `path` at `rev` (latest when `None`).
    async fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<PathInfo>;

    /// Block until the first mutation with revision >= `from_rev` whose
    /// path matches `glob`. `*` matches within one segment, `**`
    /// matches across segments.
    async fn wait(&self, glob: &str, from_rev: i64) -> StoreResult<RawEvent>;

    /// All live file paths at or under `path` at `rev`, sorted.
    async fn walk(&self, path: &str, rev: i64) -> StoreResult<Vec<String>>;

    /// Close the connection. Pending and future `wait`s return
    /// [`StoreError::Closed`]; in-flight writes may still land.
    async fn close(&self);
}

/// Validate an absolute store path: `/`-rooted, no empty segments,
/// no trailing slash (except the root itself).
pub(crate) fn check_path(path: &str) -> StoreResult<()> {
    if !path.starts_with('/') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    if path != "/" && (path.ends_with('/') || path.contains("//")) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Compile a doozer-style glob into an anchored regex.
pub(crate) fn glob_to_regex(glob: &str) -> StoreResult<regex::Regex> {
    let mut pat = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    pat.push_str(".*");
                } else {
                    pat.push_str("[^/]*");
                }
            }
            c => pat.push_str(&regex::escape(&c.to_string())),
        }
    }
    pat.push('$');
    regex::Regex::new(&pat).map_err(|_| StoreError::BadGlob(glob.to_string()))
}
