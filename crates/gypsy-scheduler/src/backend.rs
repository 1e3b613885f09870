//! Where the builder reads pipelines and writes results.

use async_trait::async_trait;
use bytes::Bytes;
use gypsy_core::{Error, Pipeline, Result, Run, RunId};
use gypsy_store::{ArtifactRepo, PipelineRepo, RedbStore, RunRepo};

#[async_trait]
pub trait BuildBackend: Send + Sync {
    async fn fetch_pipeline(&self, name: &str) -> Result<Pipeline>;
    async fn store_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> Result<()>;
    async fn record_run(&self, run: &Run) -> Result<()>;
}

/// Backend writing straight into the local store.
#[derive(Clone)]
pub struct StoreBackend {
    store: RedbStore,
}

impl StoreBackend {
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuildBackend for StoreBackend {
    async fn fetch_pipeline(&self, name: &str) -> Result<Pipeline> {
        self.store
            .get_pipeline(name)
            .await
            .map_err(|e| Error::Fetch(e.to_string()))
    }

    async fn store_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> Result<()> {
        self.store
            .put_artifact(pipeline, run, name, data)
            .await
            .map_err(|e| Error::Artifact(format!("{}: {}", name, e)))
    }

    async fn record_run(&self, run: &Run) -> Result<()> {
        Ok(self.store.put_run(run).await?)
    }
}
