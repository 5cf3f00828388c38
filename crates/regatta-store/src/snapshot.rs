//! Revision-pinned handles over a backend connection.
//!
//! A [`Snapshot`] is `{conn, rev}`: an immutable view of the tree at
//! one revision. Reads through a snapshot are historically consistent;
//! writes are compare-and-set against the snapshot's revision and
//! return a *new* snapshot pinned to the post-write revision, so
//! read-your-writes holds by construction.

use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, RawEvent};
use crate::error::{StoreError, StoreResult};

/// A backend bound to a tree prefix. All paths handed to a `Conn` are
/// relative to its root; watch events come back root-stripped.
#[derive(Clone)]
pub struct Conn {
    backend: Arc<dyn Backend>,
    root: String,
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn").field("root", &self.root).finish()
    }
}

impl Conn {
    /// Bind a backend to a root prefix. The root must be `/`-rooted;
    /// `"/"` means the whole tree.
    pub fn new(backend: Arc<dyn Backend>, root: &str) -> StoreResult<Conn> {
        if !root.starts_with('/') || (root != "/" && root.ends_with('/')) {
            return Err(StoreError::InvalidPath(root.to_string()));
        }
        let root = if root == "/" { String::new() } else { root.to_string() };
        Ok(Conn { backend, root })
    }

    pub fn root(&self) -> &str {
        if self.root.is_empty() {
            "/"
        } else {
            &self.root
        }
    }

    /// Absolute store path for a root-relative one.
    fn abs(&self, path: &str) -> String {
        if path == "/" {
            if self.root.is_empty() {
                "/".to_string()
            } else {
                self.root.clone()
            }
        } else {
            format!("{}{}", self.root, path)
        }
    }

    /// Root-relative path for an absolute one, if under the root.
    fn rel<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(&self.root) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    /// The latest committed revision.
    pub async fn rev(&self) -> StoreResult<i64> {
        self.backend.rev().await
    }

    /// Close the underlying backend; pending waits fail with `Closed`.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

/// An immutable handle to the tree at one revision.
#[derive(Debug, Clone)]
pub struct Snapshot {
    conn: Conn,
    pub rev: i64,
}

impl Snapshot {
    /// Snapshot at the backend's latest revision.
    pub async fn latest(conn: Conn) -> StoreResult<Snapshot> {
        let rev = conn.rev().await?;
        Ok(Snapshot { conn, rev })
    }

    /// Re-pin to an arbitrary revision. No round-trip; historical
    /// reads are always valid.
    pub fn at(&self, rev: i64) -> Snapshot {
        Snapshot {
            conn: self.conn.clone(),
            rev,
        }
    }

    /// Snapshot at the current latest revision.
    pub async fn fast_forward(&self) -> StoreResult<Snapshot> {
        let rev = self.conn.rev().await?;
        Ok(self.at(rev))
    }

    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        let info = self.conn.backend.stat(&self.conn.abs(path), Some(self.rev)).await?;
        Ok(info.exists())
    }

    pub async fn get(&self, path: &str) -> StoreResult<String> {
        let (body, _) = self
            .conn
            .backend
            .get(&self.conn.abs(path), Some(self.rev))
            .await?;
        Ok(body)
    }

    /// Sorted names of the live direct children of `path`; empty when
    /// the directory is absent.
    pub async fn getdir(&self, path: &str) -> StoreResult<Vec<String>> {
        self.conn
            .backend
            .getdir(&self.conn.abs(path), self.rev, 0, None)
            .await
    }

    /// Compare-and-set write; returns the post-write snapshot.
    pub async fn set(&self, path: &str, body: &str) -> StoreResult<Snapshot> {
        let rev = self
            .conn
            .backend
            .set(&self.conn.abs(path), self.rev, body)
            .await?;
        Ok(self.at(rev))
    }

    /// Compare-and-set delete of a single file; returns the
    /// post-delete snapshot.
    pub async fn del(&self, path: &str) -> StoreResult<Snapshot> {
        let rev = self.conn.backend.del(&self.conn.abs(path), self.rev).await?;
        Ok(self.at(rev))
    }

    /// Recursive delete: walks the live files under `path` and removes
    /// them one by one, threading the revision through so the sweep is
    /// not self-conflicting. Files deleted concurrently are skipped.
    pub async fn del_rec(&self, path: &str) -> StoreResult<Snapshot> {
        let abs = self.conn.abs(path);
        let files = self.conn.backend.walk(&abs, self.rev).await?;
        let mut rev = self.rev;
        for file in files {
            match self.conn.backend.del(&file, rev).await {
                Ok(new_rev) => rev = new_rev,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.at(rev))
    }

    /// Block for the next mutation strictly after this snapshot's
    /// revision whose root-relative path matches `glob`. Returns the
    /// root-stripped event and a snapshot pinned at its revision.
    pub async fn wait(&self, glob: &str) -> StoreResult<(RawEvent, Snapshot)> {
        let abs_glob = self.conn.abs(glob);
        let mut from = self.rev + 1;
        loop {
            let ev = self.conn.backend.wait(&abs_glob, from).await?;
            let rev = ev.rev;
            match self.conn.rel(&ev.path) {
                Some(rel) => {
                    let ev = RawEvent {
                        path: rel.to_string(),
                        ..ev
                    };
                    return Ok((ev, self.at(rev)));
                }
                // Not under the root; skip past it.
                None => from = rev + 1,
            }
        }
    }
}
