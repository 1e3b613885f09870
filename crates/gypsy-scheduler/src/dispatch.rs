//! Hands triggered runs to a builder.

use async_trait::async_trait;
use gypsy_core::{Pipeline, Result, RunId};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::builder::Builder;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Start a build of `pipeline` as run `run_id`. Returns once the build
    /// is handed off, not when it finishes.
    async fn dispatch(&self, pipeline: &Pipeline, run_id: RunId) -> Result<()>;
}

/// Runs each build as a task in this process.
pub struct LocalDispatcher {
    builder: Arc<Builder>,
}

impl LocalDispatcher {
    pub fn new(builder: Arc<Builder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, pipeline: &Pipeline, run_id: RunId) -> Result<()> {
        let builder = self.builder.clone();
        let name = pipeline.name.clone();

        info!(pipeline = %name, run_id, "Dispatching local build");
        tokio::spawn(async move {
            match builder.build(&name, run_id).await {
                Ok(outcome) => {
                    if let Some(e) = &outcome.release_error {
                        warn!(pipeline = %name, run_id, error = %e, "Build finished with release failure");
                    }
                    info!(pipeline = %name, run_id, success = outcome.run.success, "Build finished");
                }
                Err(e) => {
                    error!(pipeline = %name, run_id, error = %e, "Build aborted");
                }
            }
        });
        Ok(())
    }
}
