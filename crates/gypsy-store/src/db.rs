//! redb-backed store.

use gypsy_config::ArtifactStorage;
use gypsy_core::RunId;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::{StoreError, StoreResult};

/// Pipeline name -> pipeline JSON.
pub(crate) const PIPELINES: TableDefinition<&str, &[u8]> = TableDefinition::new("pipelines");
/// (pipeline, run) -> run JSON.
pub(crate) const RUNS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("runs");
/// (pipeline, run, artifact name) -> encoded [`StoredArtifact`].
pub(crate) const ARTIFACTS: TableDefinition<(&str, u64, &str), &[u8]> =
    TableDefinition::new("artifacts");
/// (pipeline, material watermark key) -> revision.
pub(crate) const WATERMARKS: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("watermarks");
/// Pipeline name -> last allocated run sequence.
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
/// (pipeline, run) of deleted runs. Their numbers stay allocated but take no
/// more writes.
pub(crate) const DELETED_RUNS: TableDefinition<(&str, u64), ()> =
    TableDefinition::new("deleted_runs");

/// Store over a single redb file.
///
/// Cheap to clone; clones share the database handle. Every mutation is one
/// write transaction and readers see a consistent snapshot.
#[derive(Clone)]
pub struct RedbStore {
    pub(crate) db: Arc<Database>,
    pub(crate) artifact_dir: PathBuf,
    pub(crate) storage: ArtifactStorage,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("artifact_dir", &self.artifact_dir)
            .field("storage", &self.storage)
            .finish()
    }
}

impl RedbStore {
    /// Open (or create) the database at `path` and make sure every table exists.
    pub fn open(
        path: impl AsRef<Path>,
        artifact_dir: impl Into<PathBuf>,
        storage: ArtifactStorage,
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(PIPELINES)?;
        txn.open_table(RUNS)?;
        txn.open_table(ARTIFACTS)?;
        txn.open_table(WATERMARKS)?;
        txn.open_table(SEQUENCES)?;
        txn.open_table(DELETED_RUNS)?;
        txn.commit()?;

        let artifact_dir = artifact_dir.into();
        info!(path = %path.display(), artifact_dir = %artifact_dir.display(), ?storage, "Opened store");

        Ok(Self {
            db: Arc::new(db),
            artifact_dir,
            storage,
        })
    }

    /// Highest run sequence allocated for a pipeline, 0 if none.
    pub fn last_sequence(&self, pipeline: &str) -> StoreResult<RunId> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SEQUENCES)?;
        Ok(table.get(pipeline)?.map(|v| v.value()).unwrap_or(0))
    }

    /// A run is known once its sequence was allocated or its record written,
    /// until it is deleted.
    pub(crate) fn run_is_known(&self, pipeline: &str, run: RunId) -> StoreResult<bool> {
        if run == 0 || run > self.last_sequence(pipeline)? {
            return Ok(false);
        }
        let txn = self.db.begin_read()?;
        let deleted = txn.open_table(DELETED_RUNS)?;
        Ok(deleted.get((pipeline, run))?.is_none())
    }

    pub(crate) fn artifact_path(&self, pipeline: &str, run: RunId, name: &str) -> PathBuf {
        self.artifact_dir
            .join(pipeline)
            .join(run.to_string())
            .join(name)
    }
}

/// Where the bytes of one artifact live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoredArtifact {
    Inline(Vec<u8>),
    File(PathBuf),
}

impl StoredArtifact {
    const INLINE: u8 = 0;
    const FILE: u8 = 1;

    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            StoredArtifact::Inline(data) => {
                let mut out = Vec::with_capacity(data.len() + 1);
                out.push(Self::INLINE);
                out.extend_from_slice(data);
                out
            }
            StoredArtifact::File(path) => {
                let path = path.to_string_lossy();
                let mut out = Vec::with_capacity(path.len() + 1);
                out.push(Self::FILE);
                out.extend_from_slice(path.as_bytes());
                out
            }
        }
    }

    pub(crate) fn decode(raw: &[u8]) -> StoreResult<Self> {
        match raw.split_first() {
            Some((&Self::INLINE, data)) => Ok(StoredArtifact::Inline(data.to_vec())),
            Some((&Self::FILE, path)) => {
                let path = std::str::from_utf8(path)
                    .map_err(|e| StoreError::Corrupt(format!("artifact path: {}", e)))?;
                Ok(StoredArtifact::File(PathBuf::from(path)))
            }
            Some((tag, _)) => Err(StoreError::Corrupt(format!("artifact tag {}", tag))),
            None => Err(StoreError::Corrupt("empty artifact record".to_string())),
        }
    }
}

/// Rejects names that cannot be used as a single path component.
pub(crate) fn check_name(kind: &str, name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidInput(format!(
            "invalid {} name '{}'",
            kind, name
        )));
    }
    Ok(())
}
