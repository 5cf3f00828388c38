//! A path prefix treated as a record with named fields.
//!
//! Every registry entity is backed by a `Dir`: its leaf files are the
//! record's fields (`registered`, `repo-url`, `attrs`, …). A `Dir` is
//! snapshot-bound like everything else; mutating returns a new `Dir`
//! pinned to the post-write revision.

use crate::error::StoreResult;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone)]
pub struct Dir {
    snapshot: Snapshot,
    /// Root-relative path of the prefix.
    pub name: String,
}

impl Dir {
    pub fn new(snapshot: Snapshot, name: impl Into<String>) -> Dir {
        Dir {
            snapshot,
            name: name.into(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The same prefix bound to a different snapshot.
    pub fn at(&self, snapshot: Snapshot) -> Dir {
        Dir {
            snapshot,
            name: self.name.clone(),
        }
    }

    /// Full path of a field file under this prefix.
    pub fn file(&self, field: &str) -> String {
        format!("{}/{}", self.name, field)
    }

    /// Compare-and-set write of one field.
    pub async fn set(&self, field: &str, body: &str) -> StoreResult<Dir> {
        let snapshot = self.snapshot.set(&self.file(field), body).await?;
        Ok(self.at(snapshot))
    }

    pub async fn get(&self, field: &str) -> StoreResult<String> {
        self.snapshot.get(&self.file(field)).await
    }

    /// Delete one field file.
    pub async fn del(&self, field: &str) -> StoreResult<Dir> {
        let snapshot = self.snapshot.del(&self.file(field)).await?;
        Ok(self.at(snapshot))
    }

    /// Recursively delete the whole prefix.
    pub async fn del_all(&self) -> StoreResult<Dir> {
        let snapshot = self.snapshot.del_rec(&self.name).await?;
        Ok(self.at(snapshot))
    }

    /// Does the prefix exist at all (any live file under it)?
    pub async fn exists(&self) -> StoreResult<bool> {
        self.snapshot.exists(&self.name).await
    }

    pub async fn exists_file(&self, field: &str) -> StoreResult<bool> {
        self.snapshot.exists(&self.file(field)).await
    }

    /// Sorted names of the direct children.
    pub async fn list(&self) -> StoreResult<Vec<String>> {
        self.snapshot.getdir(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mem::MemBackend;
    use crate::snapshot::Conn;

    async fn dir(name: &str) -> Dir {
        let conn = Conn::new(Arc::new(MemBackend::new()), "/t").unwrap();
        Dir::new(Snapshot::latest(conn).await.unwrap(), name)
    }

    #[tokio::test]
    async fn fields_roundtrip() {
        let d = dir("/apps/cat").await;
        let d = d.set("registered", "now").await.unwrap();
        let d = d.set("repo-url", "git://cat").await.unwrap();

        assert_eq!(d.get("registered").await.unwrap(), "now");
        assert_eq!(d.get("repo-url").await.unwrap(), "git://cat");
        assert_eq!(d.list().await.unwrap(), vec!["registered", "repo-url"]);
    }

    #[tokio::test]
    async fn exists_tracks_the_prefix() {
        let d = dir("/apps/cat").await;
        assert!(!d.exists().await.unwrap());

        let d = d.set("registered", "now").await.unwrap();
        assert!(d.exists().await.unwrap());
        assert!(d.exists_file("registered").await.unwrap());
        assert!(!d.exists_file("stack").await.unwrap());
    }

    #[tokio::test]
    async fn del_all_clears_the_record() {
        let d = dir("/apps/cat").await;
        let d = d.set("registered", "now").await.unwrap();
        let d = d.set("env/KEY", "v").await.unwrap();

        let d = d.del_all().await.unwrap();
        assert!(!d.exists().await.unwrap());
        assert!(d.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_dir_write_conflicts() {
        let d = dir("/apps/cat").await;
        let _ = d.set("registered", "first").await.unwrap();
        assert!(d.set("registered", "second").await.unwrap_err().is_conflict());
    }
}
