//! Builder - runs one pipeline revision inside a sandbox.

use gypsy_core::sandbox::{Sandbox, SandboxProvider, minimal_env};
use gypsy_core::{Error, OutputLog, Pipeline, Result, Run, RunId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::BuildBackend;

/// Phase of a build.
///
/// `Fetching -> Provisioning -> Executing -> CollectingArtifacts ->
/// Reporting -> Done`. Any phase may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Fetching,
    Provisioning,
    Executing,
    CollectingArtifacts,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Fetching => "fetching",
            BuildPhase::Provisioning => "provisioning",
            BuildPhase::Executing => "executing",
            BuildPhase::CollectingArtifacts => "collecting_artifacts",
            BuildPhase::Reporting => "reporting",
            BuildPhase::Done => "done",
            BuildPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a build that got far enough to produce a run record.
#[derive(Debug)]
pub struct BuildOutcome {
    /// The run exactly as it was reported.
    pub run: Run,
    /// Phase the run failed in, if it failed.
    pub failed_in: Option<BuildPhase>,
    /// Sandbox teardown failure. Does not affect `run.success`.
    pub release_error: Option<Error>,
}

/// Runs builds against a backend with sandboxes from a provider.
pub struct Builder {
    backend: Arc<dyn BuildBackend>,
    sandboxes: Arc<dyn SandboxProvider>,
    env: Vec<(String, String)>,
}

impl Builder {
    pub fn new(backend: Arc<dyn BuildBackend>, sandboxes: Arc<dyn SandboxProvider>) -> Self {
        Self {
            backend,
            sandboxes,
            env: minimal_env(),
        }
    }

    /// Build `pipeline_name` as run `run_id`.
    ///
    /// Fetch and provisioning failures return `Err` without a run record.
    /// Later failures produce a failed run, which is reported like any other.
    pub async fn build(&self, pipeline_name: &str, run_id: RunId) -> Result<BuildOutcome> {
        debug!(pipeline = %pipeline_name, run_id, phase = %BuildPhase::Fetching, "Build phase");
        let pipeline = match self.backend.fetch_pipeline(pipeline_name).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(pipeline = %pipeline_name, run_id, error = %e, "Failed to fetch pipeline");
                return Err(match e {
                    Error::Fetch(_) => e,
                    other => Error::Fetch(other.to_string()),
                });
            }
        };

        debug!(pipeline = %pipeline_name, run_id, phase = %BuildPhase::Provisioning, "Build phase");
        let sandbox = match self.sandboxes.acquire(&pipeline.container).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!(pipeline = %pipeline_name, run_id, container = %pipeline.container, error = %e, "Failed to provision sandbox");
                return Err(match e {
                    Error::Provision(_) => e,
                    other => Error::Provision(other.to_string()),
                });
            }
        };
        info!(pipeline = %pipeline_name, run_id, sandbox = %sandbox.id(), "Sandbox ready");

        let mut run = Run::new(pipeline_name, run_id);
        let mut failed_in = self.execute(&pipeline, run_id, sandbox.as_ref(), &mut run).await;

        if failed_in.is_none() && !pipeline.artifacts.is_empty() {
            failed_in = self.collect_artifacts(&pipeline, run_id, sandbox.as_ref()).await;
        }

        debug!(pipeline = %pipeline_name, run_id, phase = %BuildPhase::Reporting, "Build phase");
        let release_error = match sandbox.release().await {
            Ok(()) => None,
            Err(e) => {
                warn!(pipeline = %pipeline_name, run_id, sandbox = %sandbox.id(), error = %e, "Failed to release sandbox");
                Some(e)
            }
        };

        run.complete(failed_in.is_none());
        self.backend.record_run(&run).await?;

        match failed_in {
            None => info!(pipeline = %pipeline_name, run_id, phase = %BuildPhase::Done, "Build succeeded"),
            Some(phase) => warn!(pipeline = %pipeline_name, run_id, failed_in = %phase, "Build failed"),
        }

        Ok(BuildOutcome {
            run,
            failed_in,
            release_error,
        })
    }

    /// Run every script in order, stopping at the first failure.
    async fn execute(
        &self,
        pipeline: &Pipeline,
        run_id: RunId,
        sandbox: &dyn Sandbox,
        run: &mut Run,
    ) -> Option<BuildPhase> {
        debug!(pipeline = %pipeline.name, run_id, phase = %BuildPhase::Executing, "Build phase");
        let mut log = OutputLog::default();
        let mut failed = None;

        for script in &pipeline.scripts {
            info!(pipeline = %pipeline.name, run_id, command = %script.command, "Executing command");
            match sandbox
                .run_command(&script.command, script.working_dir(), &self.env)
                .await
            {
                Ok(output) => {
                    log.push(&output.stdout, &output.stderr);
                    if !output.success() {
                        warn!(pipeline = %pipeline.name, run_id, command = %script.command, exit_code = output.exit_code, "Command failed");
                        failed = Some(BuildPhase::Executing);
                        break;
                    }
                }
                Err(e) => {
                    error!(pipeline = %pipeline.name, run_id, command = %script.command, error = %e, "Failed to execute command");
                    log.push(b"", e.to_string().as_bytes());
                    failed = Some(BuildPhase::Executing);
                    break;
                }
            }
        }

        log.write_into(run);
        failed
    }

    /// Copy declared artifacts out of the sandbox. Artifacts stored before a
    /// failure stay in place.
    async fn collect_artifacts(
        &self,
        pipeline: &Pipeline,
        run_id: RunId,
        sandbox: &dyn Sandbox,
    ) -> Option<BuildPhase> {
        debug!(pipeline = %pipeline.name, run_id, phase = %BuildPhase::CollectingArtifacts, "Build phase");
        for artifact in &pipeline.artifacts {
            let stored = match sandbox.read_file(&artifact.path).await {
                Ok(data) => {
                    self.backend
                        .store_artifact(&pipeline.name, run_id, &artifact.name, data)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                error!(pipeline = %pipeline.name, run_id, artifact = %artifact.name, path = %artifact.path, error = %e, "Failed to collect artifact");
                return Some(BuildPhase::CollectingArtifacts);
            }
            debug!(pipeline = %pipeline.name, run_id, artifact = %artifact.name, "Collected artifact");
        }
        None
    }
}
