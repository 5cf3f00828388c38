//! The registry store — entry point for everything.
//!
//! A `Store` wraps a [`Snapshot`] and hands out snapshot-bound entity
//! values. The usual bootstrap is
//!
//! ```text
//! let store = Store::dial_uri("mem:", "/my-fleet").await?.init().await?;
//! ```
//!
//! after which constructors (`new_app`, `new_proc`, …), lookups and
//! the watchers (`watch_event`, `watch_event_raw`) are available.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use regatta_store::{dial_backend, dial_uri, Backend, Snapshot};
use tracing::{debug, info};

use crate::app::{self, App};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::instance::{self, InsStatus, Instance};
use crate::paths::{check_name, proc_instances_path, REGISTERED};
use crate::proc::Proc;
use crate::revision::Revision;
use crate::service::{self, Service};

/// Environment instances are registered into when scaling does not
/// say otherwise.
pub const DEFAULT_ENV: &str = "default";

/// A connection to the registry, pinned at a revision.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) snapshot: Snapshot,
}

/// Outcome of a [`Store::scale`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleOutcome {
    /// Live instance count before the request.
    pub previous: i64,
    /// Ids of newly registered instances (scale-up).
    pub registered: Vec<i64>,
    /// Ids that received stop tickets (scale-down).
    pub stopped: Vec<i64>,
}

impl Store {
    /// Dial a connection URI and bind the registry to a tree prefix.
    pub async fn dial_uri(uri: &str, root: &str) -> Result<Store> {
        let conn = dial_uri(uri, root).await?;
        let snapshot = Snapshot::latest(conn).await?;
        debug!(%uri, %root, "registry dialed");
        Ok(Store { snapshot })
    }

    /// Bind the registry to an externally supplied KV transport.
    pub async fn dial_with(backend: Arc<dyn Backend>, root: &str) -> Result<Store> {
        let conn = dial_backend(backend, root)?;
        let snapshot = Snapshot::latest(conn).await?;
        Ok(Store { snapshot })
    }

    /// The snapshot this store is pinned at.
    pub fn get_snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Store at the latest revision.
    pub async fn fast_forward(&self) -> Result<Store> {
        Ok(Store {
            snapshot: self.snapshot.fast_forward().await?,
        })
    }

    /// Idempotent bootstrap: writes the tree marker that `reset` and
    /// fast-forwarding watchers key off.
    pub async fn init(&self) -> Result<Store> {
        let snapshot = self.snapshot.fast_forward().await?;
        if snapshot.exists(&format!("/{REGISTERED}")).await? {
            return Ok(Store { snapshot });
        }
        let snapshot = snapshot
            .set(&format!("/{REGISTERED}"), &epoch_secs().to_string())
            .await?;
        info!(root = %snapshot.conn().root(), "registry initialized");
        Ok(Store { snapshot })
    }

    /// Wipe everything under the root. Test support; production trees
    /// are unregistered entity by entity.
    pub async fn reset(&self) -> Result<Store> {
        let snapshot = self.snapshot.fast_forward().await?;
        let snapshot = snapshot.del_rec("/").await?;
        Ok(Store { snapshot })
    }

    /// Close the underlying connection; pending watch calls return an
    /// error and the watcher loops exit.
    pub async fn close(&self) {
        self.snapshot.conn().close().await;
    }

    // ── Entity constructors ────────────────────────────────────────

    pub fn new_app(&self, name: &str, repo_url: &str, stack: &str) -> Result<App> {
        App::new(name, repo_url, stack, self.snapshot.clone())
    }

    pub fn new_revision(&self, app: &App, name: &str, archive_url: &str) -> Result<Revision> {
        Revision::new(app, name, archive_url)
    }

    pub fn new_proc(&self, app: &App, name: &str) -> Result<Proc> {
        Proc::new(app, name)
    }

    pub fn new_service(&self, name: &str) -> Result<Service> {
        Service::new(name, self.snapshot.clone())
    }

    pub fn new_endpoint(&self, service: &Service, addr: &str, port: u16) -> Result<Endpoint> {
        Endpoint::new(service, addr, port)
    }

    /// Allocate an id and register a fresh instance of
    /// (app, rev, proc) in `env`, starting out `pending`.
    pub async fn register_instance(
        &self,
        app: &str,
        rev: &str,
        proc: &str,
        env: &str,
    ) -> Result<Instance> {
        instance::register_instance(app, rev, proc, env, self.snapshot.clone()).await
    }

    // ── Lookups ────────────────────────────────────────────────────

    pub async fn get_app(&self, name: &str) -> Result<App> {
        app::get_app(name, self.snapshot.clone()).await
    }

    pub async fn get_service(&self, name: &str) -> Result<Service> {
        service::get_service(name, self.snapshot.clone()).await
    }

    pub async fn get_instance(&self, id: i64) -> Result<Instance> {
        instance::get_instance(id, self.snapshot.clone()).await
    }

    // ── Scaling ────────────────────────────────────────────────────

    /// Drive the live instance count of (app, rev, proc) towards
    /// `target`.
    ///
    /// Scaling up registers the difference into [`DEFAULT_ENV`].
    /// Scaling down files stop tickets, newest instances first; only
    /// running instances can be stopped, and if there are not enough
    /// of them the request fails with `InsufficientInstances` before
    /// any ticket is written.
    pub async fn scale(
        &self,
        app: &str,
        rev: &str,
        proc: &str,
        target: i64,
    ) -> Result<ScaleOutcome> {
        check_name(app)?;
        check_name(rev)?;
        if target < 0 {
            return Err(Error::InsufficientInstances);
        }

        let snapshot = self.snapshot.fast_forward().await?;
        let index = proc_instances_path(app, proc)?;

        let mut live = 0i64;
        let mut running = Vec::new();
        for name in snapshot.getdir(&index).await? {
            let id: i64 = match name.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let ins = instance::get_instance(id, snapshot.clone()).await?;
            if ins.rev_name != rev {
                continue;
            }
            match ins.status {
                InsStatus::Pending | InsStatus::Claimed => live += 1,
                InsStatus::Running => {
                    live += 1;
                    running.push(ins);
                }
                _ => {}
            }
        }

        let mut outcome = ScaleOutcome {
            previous: live,
            registered: Vec::new(),
            stopped: Vec::new(),
        };

        if target > live {
            for _ in live..target {
                let ins = self.register_instance(app, rev, proc, DEFAULT_ENV).await?;
                outcome.registered.push(ins.id);
            }
            info!(%app, %rev, %proc, from = live, to = target, "scaled up");
        } else if target < live {
            let excess = (live - target) as usize;
            if running.len() < excess {
                return Err(Error::InsufficientInstances);
            }
            running.sort_unstable_by_key(|i| i.id);
            for ins in running.iter().rev().take(excess) {
                ins.stop().await?;
                outcome.stopped.push(ins.id);
            }
            info!(%app, %rev, %proc, from = live, to = target, "scaled down");
        } else {
            debug!(%app, %rev, %proc, target, "already at target");
        }

        Ok(outcome)
    }
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
