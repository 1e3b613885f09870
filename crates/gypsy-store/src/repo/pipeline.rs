//! Pipeline repository.

use async_trait::async_trait;
use gypsy_core::Pipeline;
use redb::{ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::db::{PIPELINES, WATERMARKS, check_name};
use crate::{RedbStore, StoreError, StoreResult};

#[async_trait]
pub trait PipelineRepo: Send + Sync {
    /// Create or replace a pipeline.
    async fn put_pipeline(&self, pipeline: &Pipeline) -> StoreResult<()>;
    async fn get_pipeline(&self, name: &str) -> StoreResult<Pipeline>;
    /// Names of all pipelines, sorted.
    async fn list_pipelines(&self) -> StoreResult<Vec<String>>;
    async fn list_pipeline_specs(&self) -> StoreResult<Vec<Pipeline>>;
    /// Delete a pipeline and its watermarks. Runs and the sequence counter
    /// stay, so a recreated pipeline never reuses a run number.
    async fn delete_pipeline(&self, name: &str) -> StoreResult<()>;
}

#[async_trait]
impl PipelineRepo for RedbStore {
    async fn put_pipeline(&self, pipeline: &Pipeline) -> StoreResult<()> {
        check_name("pipeline", &pipeline.name)?;
        let value = serde_json::to_vec(pipeline)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PIPELINES)?;
            table.insert(pipeline.name.as_str(), value.as_slice())?;
        }
        txn.commit()?;

        debug!(pipeline = %pipeline.name, "Stored pipeline");
        Ok(())
    }

    async fn get_pipeline(&self, name: &str) -> StoreResult<Pipeline> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PIPELINES)?;
        let value = table
            .get(name)?
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {}", name)))?;
        Ok(serde_json::from_slice(value.value())?)
    }

    async fn list_pipelines(&self) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PIPELINES)?;
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    async fn list_pipeline_specs(&self) -> StoreResult<Vec<Pipeline>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PIPELINES)?;
        let mut pipelines = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            pipelines.push(serde_json::from_slice(value.value())?);
        }
        Ok(pipelines)
    }

    async fn delete_pipeline(&self, name: &str) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut pipelines = txn.open_table(PIPELINES)?;
            if pipelines.remove(name)?.is_none() {
                return Err(StoreError::NotFound(format!("pipeline {}", name)));
            }

            let mut watermarks = txn.open_table(WATERMARKS)?;
            let mut keys = Vec::new();
            for entry in watermarks.range((name, "")..)? {
                let (key, _) = entry?;
                let (owner, material) = key.value();
                if owner != name {
                    break;
                }
                keys.push(material.to_string());
            }
            for key in &keys {
                watermarks.remove((name, key.as_str()))?;
            }
        }
        txn.commit()?;

        debug!(pipeline = %name, "Deleted pipeline");
        Ok(())
    }
}
