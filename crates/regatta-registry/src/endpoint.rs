//! Service endpoints, identified by a dash-encoded `ip-port`.

use std::net::IpAddr;

use regatta_store::{Dir, Snapshot};
use tracing::info;

use crate::error::{Error, Result};
use crate::paths::{endpoint_id, endpoint_path, REGISTERED};
use crate::service::Service;
use crate::store::epoch_secs;

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub service_name: String,
    /// Stable id derived from the address: `1.2.3.4`,1000 →
    /// `1-2-3-4-1000`.
    pub id: String,
    pub addr: IpAddr,
    pub port: u16,
    dir: Dir,
}

impl Endpoint {
    pub(crate) fn new(service: &Service, addr: &str, port: u16) -> Result<Endpoint> {
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::InvalidName(addr.to_string()))?;
        let id = endpoint_id(&addr, port);
        let dir = Dir::new(
            service.snapshot().clone(),
            endpoint_path(&service.name, &id)?,
        );
        Ok(Endpoint {
            service_name: service.name.clone(),
            id,
            addr,
            port,
            dir,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.dir.snapshot()
    }

    fn with_dir(&self, dir: Dir) -> Endpoint {
        Endpoint {
            service_name: self.service_name.clone(),
            id: self.id.clone(),
            addr: self.addr,
            port: self.port,
            dir,
        }
    }

    /// Write the endpoint record. The owning service must be
    /// registered.
    pub async fn register(&self) -> Result<Endpoint> {
        let service_registered = self
            .dir
            .snapshot()
            .exists(&format!(
                "{}/{REGISTERED}",
                crate::paths::service_path(&self.service_name)?
            ))
            .await?;
        if !service_registered {
            return Err(Error::ServiceNotFound(self.service_name.clone()));
        }
        if self.dir.exists_file(REGISTERED).await? {
            return Err(Error::AlreadyRegistered {
                kind: "endpoint",
                id: format!("{}/{}", self.service_name, self.id),
            });
        }
        // The `registered` write lands last so the enrichment read at
        // its revision always sees a complete record.
        let dir = self.dir.set("addr", &self.addr.to_string()).await?;
        let dir = dir.set("port", &self.port.to_string()).await?;
        let dir = dir.set(REGISTERED, &epoch_secs().to_string()).await?;
        info!(service = %self.service_name, endpoint = %self.id, "endpoint registered");
        Ok(self.with_dir(dir))
    }

    /// Remove the endpoint record. Idempotent.
    pub async fn unregister(&self) -> Result<()> {
        if !self.dir.exists().await? {
            return Ok(());
        }
        self.dir.del_all().await?;
        info!(service = %self.service_name, endpoint = %self.id, "endpoint unregistered");
        Ok(())
    }
}

/// Load an endpoint of a service at a snapshot.
pub(crate) async fn get_endpoint(
    service: &Service,
    id: &str,
    snapshot: Snapshot,
) -> Result<Endpoint> {
    let dir = Dir::new(snapshot, endpoint_path(&service.name, id)?);
    let miss = || Error::EndpointNotFound {
        service: service.name.clone(),
        id: id.to_string(),
    };
    if !dir.exists_file(REGISTERED).await? {
        return Err(miss());
    }
    let addr = dir.get("addr").await?;
    let addr: IpAddr = addr.parse().map_err(|_| Error::BadRecord {
        path: dir.file("addr"),
        detail: format!("unparseable address {addr:?}"),
    })?;
    let port = dir.get("port").await?;
    let port: u16 = port.parse().map_err(|_| Error::BadRecord {
        path: dir.file("port"),
        detail: format!("unparseable port {port:?}"),
    })?;
    Ok(Endpoint {
        service_name: service.name.clone(),
        id: id.to_string(),
        addr,
        port,
        dir,
    })
}
