//! Embedded single-node engine.
//!
//! `MemBackend` implements the full [`Backend`] contract in-process:
//! global monotonic revisions, per-path history (reads at any past
//! revision), a mutation log, and blocking `wait`. It is the
//! standalone engine used by tests and single-node tooling; a
//! replicated transport provides the same semantics over the wire.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::backend::{check_path, glob_to_regex, Backend, MutationKind, PathInfo, RawEvent};
use crate::error::{StoreError, StoreResult};

/// One write or delete in a path's history. `body == None` is a
/// tombstone.
#[derive(Debug, Clone)]
struct Version {
    rev: i64,
    body: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    rev: i64,
    files: BTreeMap<String, Vec<Version>>,
    log: Vec<RawEvent>,
    closed: bool,
}

impl Inner {
    /// The body of `path` as of `rev`, if live.
    fn resolve(&self, path: &str, rev: i64) -> Option<(&str, i64)> {
        let history = self.files.get(path)?;
        let idx = history.partition_point(|v| v.rev <= rev);
        let version = history[..idx].last()?;
        version.body.as_deref().map(|b| (b, version.rev))
    }

    /// Revision of the last mutation of `path`, 0 if never touched.
    fn last_mutation(&self, path: &str) -> i64 {
        self.files
            .get(path)
            .and_then(|h| h.last())
            .map(|v| v.rev)
            .unwrap_or(0)
    }

    /// Iterate live file paths equal to or under `path` at `rev`.
    fn live_under<'a>(&'a self, path: &'a str, rev: i64) -> impl Iterator<Item = &'a str> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.files.keys().filter_map(move |key| {
            let under = key == path || key.starts_with(&prefix);
            (under && self.resolve(key, rev).is_some()).then_some(key.as_str())
        })
    }
}

/// In-process versioned KV engine.
pub struct MemBackend {
    inner: Mutex<Inner>,
    /// Bumped on every mutation (and on close) to wake waiters.
    tip: watch::Sender<i64>,
}

impl MemBackend {
    pub fn new() -> Self {
        let (tip, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            tip,
        }
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemBackend {
    async fn rev(&self) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner.rev)
    }

    async fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(String, i64)> {
        check_path(path)?;
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let rev = rev.unwrap_or(inner.rev);
        inner
            .resolve(path, rev)
            .map(|(body, file_rev)| (body.to_string(), file_rev))
            .ok_or_else(|| StoreError::KeyNotFound(path.to_string()))
    }

    async fn set(&self, path: &str, rev: i64, body: &str) -> StoreResult<i64> {
        check_path(path)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        if inner.last_mutation(path) > rev {
            return Err(StoreError::RevisionMismatch {
                path: path.to_string(),
            });
        }
        inner.rev += 1;
        let new_rev = inner.rev;
        inner.files.entry(path.to_string()).or_default().push(Version {
            rev: new_rev,
            body: Some(body.to_string()),
        });
        inner.log.push(RawEvent {
            path: path.to_string(),
            body: body.to_string(),
            rev: new_rev,
            kind: MutationKind::Set,
        });
        self.tip.send_replace(new_rev);
        Ok(new_rev)
    }

    async fn del(&self, path: &str, rev: i64) -> StoreResult<i64> {
        check_path(path)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let last = inner.last_mutation(path);
        if last > rev {
            return Err(StoreError::RevisionMismatch {
                path: path.to_string(),
            });
        }
        if inner.resolve(path, last).is_none() {
            return Err(StoreError::KeyNotFound(path.to_string()));
        }
        inner.rev += 1;
        let new_rev = inner.rev;
        inner.files.entry(path.to_string()).or_default().push(Version {
            rev: new_rev,
            body: None,
        });
        inner.log.push(RawEvent {
            path: path.to_string(),
            body: String::new(),
            rev: new_rev,
            kind: MutationKind::Del,
        });
        self.tip.send_replace(new_rev);
        Ok(new_rev)
    }

    async fn getdir(
        &self,
        path: &str,
        rev: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        check_path(path)?;
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        // BTreeMap iteration keeps children sorted; a repeated child
        // (several leaves below it) arrives consecutively.
        let mut names: Vec<String> = Vec::new();
        for key in inner.live_under(path, rev) {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let name = rest.split('/').next().unwrap_or(rest);
                if names.last().map(String::as_str) != Some(name) {
                    names.push(name.to_string());
                }
            }
        }
        let names = names.into_iter().skip(offset);
        Ok(match limit {
            Some(n) => names.take(n).collect(),
            None => names.collect(),
        })
    }

    async fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<PathInfo> {
        check_path(path)?;
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let rev = rev.unwrap_or(inner.rev);
        if let Some((_, file_rev)) = inner.resolve(path, rev) {
            return Ok(PathInfo {
                rev: file_rev,
                is_dir: false,
            });
        }
        let newest_child = inner
            .live_under(path, rev)
            .filter(|key| *key != path)
            .map(|key| inner.resolve(key, rev).map(|(_, r)| r).unwrap_or(0))
            .max();
        Ok(match newest_child {
            Some(rev) => PathInfo { rev, is_dir: true },
            None => PathInfo {
                rev: 0,
                is_dir: false,
            },
        })
    }

    async fn wait(&self, glob: &str, from_rev: i64) -> StoreResult<RawEvent> {
        let re = glob_to_regex(glob)?;
        let mut rx = self.tip.subscribe();
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if inner.closed {
                    return Err(StoreError::Closed);
                }
                let start = inner.log.partition_point(|e| e.rev < from_rev);
                if let Some(ev) = inner.log[start..].iter().find(|e| re.is_match(&e.path)) {
                    return Ok(ev.clone());
                }
            }
            if rx.changed().await.is_err() {
                return Err(StoreError::Closed);
            }
        }
    }

    async fn walk(&self, path: &str, rev: i64) -> StoreResult<Vec<String>> {
        check_path(path)?;
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner.live_under(path, rev).map(str::to_string).collect())
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.tip.send_replace(inner.rev);
    }
}
