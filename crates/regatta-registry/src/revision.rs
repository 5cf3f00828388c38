//! Code revisions, registered under their owning app.

use regatta_store::{Dir, Snapshot, StoreError};
use tracing::info;

use crate::app::App;
use crate::error::{Error, Result};
use crate::paths::{app_path, rev_path, REGISTERED};
use crate::store::epoch_secs;

/// A deployable revision of an app: a name plus the archive it is
/// built from.
#[derive(Debug, Clone)]
pub struct Revision {
    pub app_name: String,
    pub name: String,
    pub archive_url: String,
    dir: Dir,
}

impl Revision {
    pub(crate) fn new(app: &App, name: &str, archive_url: &str) -> Result<Revision> {
        let dir = Dir::new(app.snapshot().clone(), rev_path(&app.name, name)?);
        Ok(Revision {
            app_name: app.name.clone(),
            name: name.to_string(),
            archive_url: archive_url.to_string(),
            dir,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    fn with_dir(&self, dir: Dir) -> Revision {
        Revision {
            app_name: self.app_name.clone(),
            name: self.name.clone(),
            archive_url: self.archive_url.clone(),
            dir,
        }
    }

    /// Cheap existence predicate at this snapshot.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.dir.exists_file(REGISTERED).await?)
    }

    /// Write the revision record. The owning app must itself be
    /// registered; double registration is an error.
    pub async fn register(&self) -> Result<Revision> {
        let app_registered = self
            .dir
            .snapshot()
            .exists(&format!("{}/{REGISTERED}", app_path(&self.app_name)?))
            .await?;
        if !app_registered {
            return Err(Error::AppNotFound(self.app_name.clone()));
        }
        if self.exists().await? {
            return Err(Error::AlreadyRegistered {
                kind: "revision",
                id: format!("{}/{}", self.app_name, self.name),
            });
        }
        let dir = self.dir.set(REGISTERED, &epoch_secs().to_string()).await?;
        let dir = dir.set("archive-url", &self.archive_url).await?;
        info!(app = %self.app_name, rev = %self.name, "revision registered");
        Ok(self.with_dir(dir))
    }

    /// Remove the revision record. Idempotent: unregistering an absent
    /// revision returns cleanly.
    pub async fn unregister(&self) -> Result<()> {
        if !self.dir.exists().await? {
            return Ok(());
        }
        self.dir.del_all().await?;
        info!(app = %self.app_name, rev = %self.name, "revision unregistered");
        Ok(())
    }
}

/// Load a revision of an app at a snapshot.
pub(crate) async fn get_revision(app: &App, name: &str, snapshot: Snapshot) -> Result<Revision> {
    let dir = Dir::new(snapshot, rev_path(&app.name, name)?);
    if !dir.exists_file(REGISTERED).await? {
        return Err(Error::RevisionNotFound {
            app: app.name.clone(),
            rev: name.to_string(),
        });
    }
    let archive_url = match dir.get("archive-url").await {
        Ok(url) => url,
        Err(StoreError::KeyNotFound(_)) => String::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(Revision {
        app_name: app.name.clone(),
        name: name.to_string(),
        archive_url,
        dir,
    })
}
