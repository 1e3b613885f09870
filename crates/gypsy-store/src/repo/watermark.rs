//! Material watermarks.

use async_trait::async_trait;
use gypsy_core::RunId;
use redb::{ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::db::{SEQUENCES, WATERMARKS, check_name};
use crate::{RedbStore, StoreResult};

#[async_trait]
pub trait WatermarkRepo: Send + Sync {
    /// Last revision a build was triggered for. `None` means never built.
    async fn get_watermark(&self, pipeline: &str, material: &str) -> StoreResult<Option<String>>;

    /// Allocate the next run number and move the watermark to `revision`,
    /// in one transaction.
    async fn record_trigger(
        &self,
        pipeline: &str,
        material: &str,
        revision: &str,
    ) -> StoreResult<RunId>;
}

#[async_trait]
impl WatermarkRepo for RedbStore {
    async fn get_watermark(&self, pipeline: &str, material: &str) -> StoreResult<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(WATERMARKS)?;
        Ok(table
            .get((pipeline, material))?
            .map(|v| v.value().to_string()))
    }

    async fn record_trigger(
        &self,
        pipeline: &str,
        material: &str,
        revision: &str,
    ) -> StoreResult<RunId> {
        check_name("pipeline", pipeline)?;
        let txn = self.db.begin_write()?;
        let run_id = {
            let mut sequences = txn.open_table(SEQUENCES)?;
            let next = sequences.get(pipeline)?.map(|v| v.value()).unwrap_or(0) + 1;
            sequences.insert(pipeline, next)?;

            let mut watermarks = txn.open_table(WATERMARKS)?;
            watermarks.insert((pipeline, material), revision)?;
            next
        };
        txn.commit()?;

        debug!(pipeline = %pipeline, material = %material, revision = %revision, run_id, "Recorded trigger");
        Ok(run_id)
    }
}
