//! Apps — the root entity of the registry tree.

use std::collections::BTreeMap;

use regatta_store::{Dir, Snapshot, StoreError};
use tracing::info;

use crate::error::{Error, Result};
use crate::paths::{app_path, check_name, REGISTERED};
use crate::proc::{self, Proc};
use crate::revision::{self, Revision};
use crate::store::epoch_secs;

/// An application: a named codebase with a repo URL, a runtime stack
/// and a set of environment variables. Immutable and snapshot-bound;
/// mutations return a new value pinned to the post-write revision.
#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub repo_url: String,
    pub stack: String,
    dir: Dir,
}

impl App {
    pub(crate) fn new(
        name: &str,
        repo_url: &str,
        stack: &str,
        snapshot: Snapshot,
    ) -> Result<App> {
        let dir = Dir::new(snapshot, app_path(name)?);
        Ok(App {
            name: name.to_string(),
            repo_url: repo_url.to_string(),
            stack: stack.to_string(),
            dir,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    pub(crate) fn dir(&self) -> &Dir {
        &self.dir
    }

    fn with_dir(&self, dir: Dir) -> App {
        App {
            name: self.name.clone(),
            repo_url: self.repo_url.clone(),
            stack: self.stack.clone(),
            dir,
        }
    }

    /// Write the app record. Double registration is an error.
    pub async fn register(&self) -> Result<App> {
        if self.dir.exists_file(REGISTERED).await? {
            return Err(Error::AlreadyRegistered {
                kind: "app",
                id: self.name.clone(),
            });
        }
        let dir = self.dir.set(REGISTERED, &epoch_secs().to_string()).await?;
        let dir = dir.set("repo-url", &self.repo_url).await?;
        let dir = dir.set("stack", &self.stack).await?;
        info!(app = %self.name, "app registered");
        Ok(self.with_dir(dir))
    }

    /// Remove the app record.
    ///
    /// Does not cascade: revisions, procs and instances below this app
    /// are the caller's to clean up first; whatever is left under the
    /// prefix is swept as raw files, without per-entity bookkeeping.
    pub async fn unregister(&self) -> Result<()> {
        if !self.dir.exists().await? {
            return Err(Error::AppNotFound(self.name.clone()));
        }
        self.dir.del_all().await?;
        info!(app = %self.name, "app unregistered");
        Ok(())
    }

    // ── Environment ────────────────────────────────────────────────

    /// Set one environment variable; creates or replaces.
    pub async fn set_env(&self, key: &str, value: &str) -> Result<App> {
        check_env_key(key)?;
        let dir = self.dir.set(&format!("env/{key}"), value).await?;
        Ok(self.with_dir(dir))
    }

    pub async fn get_env(&self, key: &str) -> Result<String> {
        check_env_key(key)?;
        Ok(self.dir.get(&format!("env/{key}")).await?)
    }

    pub async fn del_env(&self, key: &str) -> Result<App> {
        check_env_key(key)?;
        let dir = self.dir.del(&format!("env/{key}")).await?;
        Ok(self.with_dir(dir))
    }

    /// All environment variables at this snapshot.
    pub async fn env(&self) -> Result<BTreeMap<String, String>> {
        let mut env = BTreeMap::new();
        for key in self.dir.snapshot().getdir(&self.dir.file("env")).await? {
            let value = self.dir.get(&format!("env/{key}")).await?;
            env.insert(key, value);
        }
        Ok(env)
    }

    // ── Children ───────────────────────────────────────────────────

    pub async fn get_revision(&self, name: &str) -> Result<Revision> {
        revision::get_revision(self, name, self.dir.snapshot().clone()).await
    }

    pub async fn get_proc(&self, name: &str) -> Result<Proc> {
        proc::get_proc(self, name, self.dir.snapshot().clone()).await
    }
}

/// Env keys live as path segments; all we require is that they stay
/// one segment.
fn check_env_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') {
        return Err(Error::InvalidName(key.to_string()));
    }
    Ok(())
}

/// Load an app at a snapshot; the `registered` leaf decides existence.
pub(crate) async fn get_app(name: &str, snapshot: Snapshot) -> Result<App> {
    let dir = Dir::new(snapshot, app_path(name)?);
    if !dir.exists_file(REGISTERED).await? {
        return Err(Error::AppNotFound(name.to_string()));
    }
    let repo_url = dir.get("repo-url").await.or_else(empty_if_missing)?;
    let stack = dir.get("stack").await.or_else(empty_if_missing)?;
    Ok(App {
        name: name.to_string(),
        repo_url,
        stack,
        dir,
    })
}

/// A registered app whose trailing fields are not visible yet (the
/// watcher enriches at the revision of the `registered` write, which
/// lands first) reads as empty strings rather than an error.
fn empty_if_missing(err: StoreError) -> std::result::Result<String, StoreError> {
    if err.is_not_found() {
        Ok(String::new())
    } else {
        Err(err)
    }
}
