//! Remote build command, the entry point of externally scheduled jobs.

use anyhow::{Context, Result, bail};
use gypsy_config::ServerConfig;
use gypsy_core::RunId;
use gypsy_scheduler::Builder;
use std::sync::Arc;
use tracing::warn;

use crate::client::HttpBackend;

/// Build `pipeline` as run `run_id`, reading the definition from the server
/// and posting the run and its artifacts back.
pub async fn run(config: &ServerConfig, server_url: &str, pipeline: &str, run_id: RunId) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(super::client(server_url)?));
    let builder = Builder::new(backend, super::sandbox_provider(config)?);

    let outcome = builder
        .build(pipeline, run_id)
        .await
        .with_context(|| format!("Build of {} run {} did not start", pipeline, run_id))?;

    if let Some(e) = &outcome.release_error {
        warn!(pipeline = %pipeline, run_id, error = %e, "Sandbox was not released cleanly");
    }

    match outcome.failed_in {
        None => {
            println!("✓ {} run {} succeeded", pipeline, run_id);
            Ok(())
        }
        Some(phase) => {
            eprint!("{}", outcome.run.stderr);
            bail!("{} run {} failed in phase {}", pipeline, run_id, phase);
        }
    }
}
