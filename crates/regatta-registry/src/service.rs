//! Services — named groups of addressable endpoints.

use regatta_store::{Dir, Snapshot};
use tracing::info;

use crate::endpoint::{self, Endpoint};
use crate::error::{Error, Result};
use crate::paths::{service_path, REGISTERED};
use crate::store::epoch_secs;

#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    dir: Dir,
}

impl Service {
    pub(crate) fn new(name: &str, snapshot: Snapshot) -> Result<Service> {
        let dir = Dir::new(snapshot, service_path(name)?);
        Ok(Service {
            name: name.to_string(),
            dir,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    pub(crate) fn dir(&self) -> &Dir {
        &self.dir
    }

    fn with_dir(&self, dir: Dir) -> Service {
        Service {
            name: self.name.clone(),
            dir,
        }
    }

    pub async fn register(&self) -> Result<Service> {
        if self.dir.exists_file(REGISTERED).await? {
            return Err(Error::AlreadyRegistered {
                kind: "service",
                id: self.name.clone(),
            });
        }
        let dir = self.dir.set(REGISTERED, &epoch_secs().to_string()).await?;
        info!(service = %self.name, "service registered");
        Ok(self.with_dir(dir))
    }

    /// Remove the service and its endpoints.
    pub async fn unregister(&self) -> Result<()> {
        if !self.dir.exists().await? {
            return Err(Error::ServiceNotFound(self.name.clone()));
        }
        self.dir.del_all().await?;
        info!(service = %self.name, "service unregistered");
        Ok(())
    }

    /// All registered endpoints at this snapshot.
    pub async fn get_endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::new();
        for id in self.dir.snapshot().getdir(&self.dir.file("endpoints")).await? {
            endpoints.push(endpoint::get_endpoint(self, &id, self.dir.snapshot().clone()).await?);
        }
        Ok(endpoints)
    }
}

/// Load a service at a snapshot.
pub(crate) async fn get_service(name: &str, snapshot: Snapshot) -> Result<Service> {
    let dir = Dir::new(snapshot, service_path(name)?);
    if !dir.exists_file(REGISTERED).await? {
        return Err(Error::ServiceNotFound(name.to_string()));
    }
    Ok(Service {
        name: name.to_string(),
        dir,
    })
}
