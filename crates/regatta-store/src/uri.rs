//! Connection URI parsing and dialing.
//!
//! Two schemes are understood:
//!
//! - `mem:` — the embedded single-node engine ([`MemBackend`]);
//! - `doozer:?ca=host:port&ca=…` — a replicated cluster. The wire
//!   client is an external collaborator; dialing this scheme without a
//!   supplied transport returns [`StoreError::NoTransport`], and the
//!   parsed endpoint list is available for whoever provides one.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::mem::MemBackend;
use crate::snapshot::Conn;
use crate::Backend;

/// Default connection URI: the embedded engine.
pub const DEFAULT_URI: &str = "mem:";

/// Default tree prefix.
pub const DEFAULT_ROOT: &str = "/regatta";

/// A parsed connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterUri {
    /// The embedded single-node engine.
    Mem,
    /// A doozer-style cluster: one or more `host:port` endpoints.
    Doozer { addrs: Vec<String> },
}

impl ClusterUri {
    pub fn parse(uri: &str) -> StoreResult<ClusterUri> {
        let invalid = || StoreError::InvalidUri(uri.to_string());

        if uri == "mem:" || uri == "mem://" {
            return Ok(ClusterUri::Mem);
        }

        let query = uri.strip_prefix("doozer:?").ok_or_else(invalid)?;
        let mut addrs = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
            match key {
                "ca" => {
                    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
                    if host.is_empty() || port.parse::<u16>().is_err() {
                        return Err(invalid());
                    }
                    addrs.push(value.to_string());
                }
                // Cluster name and boot URI are accepted and ignored.
                "cn" | "boot" => {}
                _ => return Err(invalid()),
            }
        }
        if addrs.is_empty() {
            return Err(invalid());
        }
        Ok(ClusterUri::Doozer { addrs })
    }
}

/// Dial a connection URI and bind it to a tree prefix.
pub async fn dial_uri(uri: &str, root: &str) -> StoreResult<Conn> {
    match ClusterUri::parse(uri)? {
        ClusterUri::Mem => Conn::new(Arc::new(MemBackend::new()), root),
        ClusterUri::Doozer { .. } => Err(StoreError::NoTransport("doozer".to_string())),
    }
}

/// Bind an externally supplied transport to a tree prefix.
pub fn dial_backend(backend: Arc<dyn Backend>, root: &str) -> StoreResult<Conn> {
    Conn::new(backend, root)
}
