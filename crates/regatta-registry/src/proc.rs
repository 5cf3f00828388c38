//! Proc types — the named process shapes of an app (`web`, `worker`)
//! and the queries over their instances.

use regatta_store::{Dir, Snapshot, StoreError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::App;
use crate::error::{Error, Result};
use crate::instance::{self, InsStatus, Instance};
use crate::paths::{
    app_path, check_proc_name, proc_done_path, proc_instances_path, proc_path, REGISTERED,
};
use crate::store::epoch_secs;

/// Resource limits for one instance of a proc.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub memory_limit_mb: Option<i64>,
}

/// Share of traffic a proc's endpoints should receive, in percent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficControl {
    pub share: i64,
}

impl TrafficControl {
    pub fn validate(&self) -> Result<()> {
        if (0..=100).contains(&self.share) {
            Ok(())
        } else {
            Err(Error::InvalidShare(self.share))
        }
    }
}

/// The serialized attributes record stored in the proc's `attrs` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcAttrs {
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub log_persistence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_control: Option<TrafficControl>,
}

impl ProcAttrs {
    fn validate(&self) -> Result<()> {
        if let Some(tc) = &self.traffic_control {
            tc.validate()?;
        }
        Ok(())
    }
}

/// A proc type of an app. Attribute changes go through
/// [`store_attrs`](Proc::store_attrs); everything else is immutable.
#[derive(Debug, Clone)]
pub struct Proc {
    pub app_name: String,
    pub name: String,
    pub attrs: ProcAttrs,
    dir: Dir,
}

impl Proc {
    pub(crate) fn new(app: &App, name: &str) -> Result<Proc> {
        let dir = Dir::new(app.snapshot().clone(), proc_path(&app.name, name)?);
        Ok(Proc {
            app_name: app.name.clone(),
            name: name.to_string(),
            attrs: ProcAttrs::default(),
            dir,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    fn with_dir(&self, dir: Dir) -> Proc {
        Proc {
            app_name: self.app_name.clone(),
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            dir,
        }
    }

    /// Write the proc record. The strict name check runs before any
    /// KV write; the owning app must be registered.
    pub async fn register(&self) -> Result<Proc> {
        check_proc_name(&self.name)?;
        let app_registered = self
            .dir
            .snapshot()
            .exists(&format!("{}/{REGISTERED}", app_path(&self.app_name)?))
            .await?;
        if !app_registered {
            return Err(Error::AppNotFound(self.app_name.clone()));
        }
        if self.dir.exists_file(REGISTERED).await? {
            return Err(Error::AlreadyRegistered {
                kind: "proc",
                id: format!("{}/{}", self.app_name, self.name),
            });
        }
        let dir = self.dir.set(REGISTERED, &epoch_secs().to_string()).await?;
        info!(app = %self.app_name, proc = %self.name, "proc registered");
        Ok(self.with_dir(dir))
    }

    /// Remove the proc record, including its instance indexes.
    pub async fn unregister(&self) -> Result<()> {
        if !self.dir.exists().await? {
            return Err(Error::ProcNotFound {
                app: self.app_name.clone(),
                proc: self.name.clone(),
            });
        }
        self.dir.del_all().await?;
        info!(app = %self.app_name, proc = %self.name, "proc unregistered");
        Ok(())
    }

    /// Validate and persist `self.attrs` with a single compare-and-set
    /// on the `attrs` file.
    pub async fn store_attrs(&self) -> Result<Proc> {
        self.attrs.validate()?;
        if !self.dir.exists_file(REGISTERED).await? {
            return Err(Error::ProcNotFound {
                app: self.app_name.clone(),
                proc: self.name.clone(),
            });
        }
        let body = serde_json::to_string(&self.attrs).map_err(|e| Error::BadRecord {
            path: self.dir.file("attrs"),
            detail: e.to_string(),
        })?;
        let dir = self.dir.set("attrs", &body).await?;
        Ok(self.with_dir(dir))
    }

    // ── Instance queries ───────────────────────────────────────────
    //
    // Each query pins one snapshot revision: the reverse index and
    // every instance are read at that same revision, so the result is
    // a consistent point-in-time view.

    /// Instances of this proc that have not failed, been lost, or been
    /// swept to done.
    pub async fn get_instances(&self) -> Result<Vec<Instance>> {
        self.indexed_instances(|i| !matches!(i.status, InsStatus::Failed | InsStatus::Lost))
            .await
    }

    pub async fn get_failed_instances(&self) -> Result<Vec<Instance>> {
        self.indexed_instances(|i| i.status == InsStatus::Failed).await
    }

    pub async fn get_lost_instances(&self) -> Result<Vec<Instance>> {
        self.indexed_instances(|i| i.status == InsStatus::Lost).await
    }

    /// Instances that were unregistered after reaching a terminal
    /// state. Their `/instances/<id>/` records are gone; the per-proc
    /// done index preserves the identity tuple.
    pub async fn get_done_instances(&self) -> Result<Vec<Instance>> {
        let snapshot = self.dir.snapshot();
        let done_path = proc_done_path(&self.app_name, &self.name)?;
        let mut instances = Vec::new();
        for id in sorted_ids(snapshot.getdir(&done_path).await?)? {
            let body = snapshot.get(&format!("{done_path}/{id}")).await?;
            instances.push(instance::from_done_record(id, &body, snapshot.clone())?);
        }
        Ok(instances)
    }

    async fn indexed_instances(&self, keep: impl Fn(&Instance) -> bool) -> Result<Vec<Instance>> {
        let snapshot = self.dir.snapshot();
        let index = proc_instances_path(&self.app_name, &self.name)?;
        let mut instances = Vec::new();
        for id in sorted_ids(snapshot.getdir(&index).await?)? {
            let instance = instance::get_instance(id, snapshot.clone()).await?;
            if keep(&instance) {
                instances.push(instance);
            }
        }
        Ok(instances)
    }
}

/// Index entries are directory names; order them numerically.
fn sorted_ids(names: Vec<String>) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = name.parse::<i64>().map_err(|_| Error::BadRecord {
            path: name.clone(),
            detail: "non-numeric instance id in index".to_string(),
        })?;
        ids.push(id);
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Load a proc of an app at a snapshot. A missing `attrs` file reads
/// as the default record.
pub(crate) async fn get_proc(app: &App, name: &str, snapshot: Snapshot) -> Result<Proc> {
    let dir = Dir::new(snapshot, proc_path(&app.name, name)?);
    if !dir.exists_file(REGISTERED).await? {
        return Err(Error::ProcNotFound {
            app: app.name.clone(),
            proc: name.to_string(),
        });
    }
    let attrs = match dir.get("attrs").await {
        Ok(body) => serde_json::from_str(&body).map_err(|e| Error::BadRecord {
            path: dir.file("attrs"),
            detail: e.to_string(),
        })?,
        Err(StoreError::KeyNotFound(_)) => ProcAttrs::default(),
        Err(e) => return Err(e.into()),
    };
    Ok(Proc {
        app_name: app.name.clone(),
        name: name.to_string(),
        attrs,
        dir,
    })
}
