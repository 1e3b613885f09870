//! Run repository.

use async_trait::async_trait;
use gypsy_core::{Run, RunId};
use redb::{ReadableDatabase, ReadableTable};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::db::{ARTIFACTS, DELETED_RUNS, RUNS, SEQUENCES, StoredArtifact, check_name};
use crate::{RedbStore, StoreError, StoreResult};

#[async_trait]
pub trait RunRepo: Send + Sync {
    /// Allocate the next run number for a pipeline. Numbers start at 1 and
    /// are never handed out twice.
    async fn allocate_run_sequence(&self, pipeline: &str) -> StoreResult<RunId>;
    /// Persist the final record of a run.
    async fn put_run(&self, run: &Run) -> StoreResult<()>;
    async fn get_run(&self, pipeline: &str, id: RunId) -> StoreResult<Run>;
    /// Run numbers with a persisted record, ascending.
    async fn list_runs(&self, pipeline: &str) -> StoreResult<Vec<RunId>>;
    /// Delete a run record together with all of its artifacts.
    async fn delete_run(&self, pipeline: &str, id: RunId) -> StoreResult<()>;
}

impl RedbStore {
    fn delete_run_records(&self, pipeline: &str, id: RunId) -> StoreResult<Vec<PathBuf>> {
        let txn = self.db.begin_write()?;
        let mut files = Vec::new();
        {
            let mut runs = txn.open_table(RUNS)?;
            if runs.remove((pipeline, id))?.is_none() {
                return Err(StoreError::NotFound(format!("run {}/{}", pipeline, id)));
            }
            txn.open_table(DELETED_RUNS)?.insert((pipeline, id), ())?;

            let mut artifacts = txn.open_table(ARTIFACTS)?;
            let mut names = Vec::new();
            for entry in artifacts.range((pipeline, id, "")..)? {
                let (key, value) = entry?;
                let (owner, run, name) = key.value();
                if owner != pipeline || run != id {
                    break;
                }
                if let StoredArtifact::File(path) = StoredArtifact::decode(value.value())? {
                    files.push(path);
                }
                names.push(name.to_string());
            }
            for name in &names {
                artifacts.remove((pipeline, id, name.as_str()))?;
            }
        }
        txn.commit()?;
        Ok(files)
    }
}

#[async_trait]
impl RunRepo for RedbStore {
    async fn allocate_run_sequence(&self, pipeline: &str) -> StoreResult<RunId> {
        check_name("pipeline", pipeline)?;
        let txn = self.db.begin_write()?;
        let next = {
            let mut table = txn.open_table(SEQUENCES)?;
            let next = table.get(pipeline)?.map(|v| v.value()).unwrap_or(0) + 1;
            table.insert(pipeline, next)?;
            next
        };
        txn.commit()?;

        debug!(pipeline = %pipeline, run_id = next, "Allocated run sequence");
        Ok(next)
    }

    async fn put_run(&self, run: &Run) -> StoreResult<()> {
        check_name("pipeline", &run.pipeline_name)?;
        if run.id == 0 {
            return Err(StoreError::InvalidInput("run id must be positive".to_string()));
        }
        let value = serde_json::to_vec(run)?;

        let txn = self.db.begin_write()?;
        {
            let mut runs = txn.open_table(RUNS)?;
            runs.insert((run.pipeline_name.as_str(), run.id), value.as_slice())?;

            // A record written under a number that was never allocated still
            // reserves it.
            let mut sequences = txn.open_table(SEQUENCES)?;
            let last = sequences
                .get(run.pipeline_name.as_str())?
                .map(|v| v.value())
                .unwrap_or(0);
            if run.id > last {
                sequences.insert(run.pipeline_name.as_str(), run.id)?;
            }

            // Writing the record again brings a deleted run back.
            txn.open_table(DELETED_RUNS)?
                .remove((run.pipeline_name.as_str(), run.id))?;
        }
        txn.commit()?;

        debug!(pipeline = %run.pipeline_name, run_id = run.id, success = run.success, "Stored run");
        Ok(())
    }

    async fn get_run(&self, pipeline: &str, id: RunId) -> StoreResult<Run> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RUNS)?;
        let value = table
            .get((pipeline, id))?
            .ok_or_else(|| StoreError::NotFound(format!("run {}/{}", pipeline, id)))?;
        Ok(serde_json::from_slice(value.value())?)
    }

    async fn list_runs(&self, pipeline: &str) -> StoreResult<Vec<RunId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RUNS)?;
        let mut ids = Vec::new();
        for entry in table.range((pipeline, 0u64)..=(pipeline, u64::MAX))? {
            let (key, _) = entry?;
            ids.push(key.value().1);
        }
        Ok(ids)
    }

    async fn delete_run(&self, pipeline: &str, id: RunId) -> StoreResult<()> {
        let files = self.delete_run_records(pipeline, id)?;

        for path in &files {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact file");
                }
            }
        }
        let run_dir = self.artifact_dir.join(pipeline).join(id.to_string());
        let _ = tokio::fs::remove_dir(&run_dir).await;

        debug!(pipeline = %pipeline, run_id = id, artifacts = files.len(), "Deleted run");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::open_store;
    use gypsy_config::ArtifactStorage;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_sequence_starts_at_one() {
        let (_dir, store) = open_store(ArtifactStorage::Files);
        assert_eq!(store.allocate_run_sequence("demo").await.unwrap(), 1);
        assert_eq!(store.allocate_run_sequence("demo").await.unwrap(), 2);
        assert_eq!(store.allocate_run_sequence("other").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_is_strictly_increasing() {
        let (_dir, store) = open_store(ArtifactStorage::Files);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    for _ in 0..25 {
                        ids.push(store.allocate_run_sequence("demo").await.unwrap());
                    }
                    ids
                })
            })
            .collect();

        let mut all = HashSet::new();
        for ids in futures::future::join_all(handles).await {
            let ids = ids.unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate run id {}", id);
            }
        }
        assert_eq!(all.len(), 200);
        assert_eq!(all.iter().max(), Some(&200));
        assert_eq!(store.last_sequence("demo").unwrap(), 200);
    }

    #[tokio::test]
    async fn test_put_get_list_runs() {
        let (_dir, store) = open_store(ArtifactStorage::Files);
        for _ in 0..3 {
            let id = store.allocate_run_sequence("demo").await.unwrap();
            let mut run = Run::new("demo", id);
            run.stdout = format!("run {}", id);
            run.complete(id != 2);
            store.put_run(&run).await.unwrap();
        }
        store.put_run(&Run::new("demo-two", 1)).await.unwrap();

        assert_eq!(store.list_runs("demo").await.unwrap(), vec![1, 2, 3]);
        let run = store.get_run("demo", 2).await.unwrap();
        assert_eq!(run.stdout, "run 2");
        assert!(!run.success);
        assert!(store.list_runs("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_unallocated_run_reserves_number() {
        let (_dir, store) = open_store(ArtifactStorage::Files);
        store.put_run(&Run::new("demo", 5)).await.unwrap();
        assert_eq!(store.allocate_run_sequence("demo").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_put_run_zero_rejected() {
        let (_dir, store) = open_store(ArtifactStorage::Files);
        assert!(matches!(
            store.put_run(&Run::new("demo", 0)).await,
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_run() {
        let (_dir, store) = open_store(ArtifactStorage::Files);
        assert!(store.get_run("demo", 1).await.unwrap_err().is_not_found());
        assert!(store.delete_run("demo", 1).await.unwrap_err().is_not_found());
    }
}
