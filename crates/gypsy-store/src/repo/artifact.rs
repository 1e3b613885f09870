//! Artifact repository.

use async_trait::async_trait;
use bytes::Bytes;
use gypsy_config::ArtifactStorage;
use gypsy_core::RunId;
use redb::{ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::db::{ARTIFACTS, DELETED_RUNS, SEQUENCES, StoredArtifact, check_name};
use crate::{RedbStore, StoreError, StoreResult};

#[async_trait]
pub trait ArtifactRepo: Send + Sync {
    /// Store an artifact under a run. The run must be known to the store.
    async fn put_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> StoreResult<()>;
    async fn get_artifact(&self, pipeline: &str, run: RunId, name: &str) -> StoreResult<Bytes>;
    /// Artifact names of a run, sorted. Empty when the run has none.
    async fn list_artifacts(&self, pipeline: &str, run: RunId) -> StoreResult<Vec<String>>;
    async fn delete_artifact(&self, pipeline: &str, run: RunId, name: &str) -> StoreResult<()>;
}

impl RedbStore {
    fn lookup_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
    ) -> StoreResult<StoredArtifact> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ARTIFACTS)?;
        let value = table.get((pipeline, run, name))?.ok_or_else(|| {
            StoreError::NotFound(format!("artifact {}/{}/{}", pipeline, run, name))
        })?;
        StoredArtifact::decode(value.value())
    }

    /// Insert the record unless the run went away since the caller checked.
    /// Returns whether the record was written.
    fn insert_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        stored: &StoredArtifact,
    ) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let last = txn
                .open_table(SEQUENCES)?
                .get(pipeline)?
                .map(|v| v.value())
                .unwrap_or(0);
            let deleted = txn
                .open_table(DELETED_RUNS)?
                .get((pipeline, run))?
                .is_some();
            if run == 0 || run > last || deleted {
                return Ok(false);
            }

            let mut table = txn.open_table(ARTIFACTS)?;
            table.insert((pipeline, run, name), stored.encode().as_slice())?;
        }
        txn.commit()?;
        Ok(true)
    }

    fn remove_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
    ) -> StoreResult<StoredArtifact> {
        let txn = self.db.begin_write()?;
        let stored = {
            let mut table = txn.open_table(ARTIFACTS)?;
            let removed = table.remove((pipeline, run, name))?.ok_or_else(|| {
                StoreError::NotFound(format!("artifact {}/{}/{}", pipeline, run, name))
            })?;
            StoredArtifact::decode(removed.value())?
        };
        txn.commit()?;
        Ok(stored)
    }
}

#[async_trait]
impl ArtifactRepo for RedbStore {
    async fn put_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> StoreResult<()> {
        check_name("pipeline", pipeline)?;
        check_name("artifact", name)?;
        if !self.run_is_known(pipeline, run)? {
            return Err(StoreError::NotFound(format!("run {}/{}", pipeline, run)));
        }

        let size = data.len();
        let stored = match self.storage {
            ArtifactStorage::Inline => StoredArtifact::Inline(data.to_vec()),
            ArtifactStorage::Files => {
                let path = self.artifact_path(pipeline, run, name);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, &data).await?;
                StoredArtifact::File(path)
            }
        };
        if !self.insert_artifact(pipeline, run, name, &stored)? {
            if let StoredArtifact::File(path) = &stored {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(StoreError::NotFound(format!("run {}/{}", pipeline, run)));
        }

        debug!(pipeline = %pipeline, run_id = run, artifact = %name, size, "Stored artifact");
        Ok(())
    }

    async fn get_artifact(&self, pipeline: &str, run: RunId, name: &str) -> StoreResult<Bytes> {
        match self.lookup_artifact(pipeline, run, name)? {
            StoredArtifact::Inline(data) => Ok(Bytes::from(data)),
            StoredArtifact::File(path) => match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(
                    format!("artifact file {}", path.display()),
                )),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn list_artifacts(&self, pipeline: &str, run: RunId) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ARTIFACTS)?;
        let mut names = Vec::new();
        for entry in table.range((pipeline, run, "")..)? {
            let (key, _) = entry?;
            let (owner, id, name) = key.value();
            if owner != pipeline || id != run {
                break;
            }
            names.push(name.to_string());
        }
        Ok(names)
    }

    async fn delete_artifact(&self, pipeline: &str, run: RunId, name: &str) -> StoreResult<()> {
        if let StoredArtifact::File(path) = self.remove_artifact(pipeline, run, name)? {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact file");
                }
            }
        }
        debug!(pipeline = %pipeline, run_id = run, artifact = %name, "Deleted artifact");
        Ok(())
    }
}
