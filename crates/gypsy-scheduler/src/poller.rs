//! Poller - watches materials and triggers builds on new revisions.

use futures::future::join_all;
use gypsy_core::{Material, Pipeline, Result, RunId};
use gypsy_store::{PipelineRepo, WatermarkRepo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::sources::SourceRegistry;

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pipelines: usize,
    pub triggered: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.triggered += other.triggered;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

enum MaterialCheck {
    Triggered(RunId),
    Unchanged,
    Unsupported,
}

/// Periodically checks every material of every pipeline.
pub struct Poller<S> {
    store: Arc<S>,
    sources: SourceRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    interval: Duration,
}

impl<S> Poller<S>
where
    S: PipelineRepo + WatermarkRepo + 'static,
{
    pub fn new(
        store: Arc<S>,
        sources: SourceRegistry,
        dispatcher: Arc<dyn Dispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sources,
            dispatcher,
            interval,
        }
    }

    /// Poll until `shutdown` turns true. The interval is measured from the
    /// end of one cycle to the start of the next.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting poller");

        loop {
            if *shutdown.borrow() {
                break;
            }

            info!("Beginning polling");
            let report = self.poll_once().await;
            info!(
                pipelines = report.pipelines,
                triggered = report.triggered,
                unchanged = report.unchanged,
                skipped = report.skipped,
                failed = report.failed,
                "Polling finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Poller stopped");
    }

    /// Run one cycle. Pipelines are checked concurrently; the cycle ends
    /// when every check has finished.
    pub async fn poll_once(&self) -> CycleReport {
        let pipelines = match self.store.list_pipeline_specs().await {
            Ok(pipelines) => pipelines,
            Err(e) => {
                error!(error = %e, "Failed to list pipelines");
                return CycleReport::default();
            }
        };

        let mut report = CycleReport {
            pipelines: pipelines.len(),
            ..Default::default()
        };
        let checks = pipelines.iter().map(|p| self.check_pipeline(p));
        for pipeline_report in join_all(checks).await {
            report.merge(pipeline_report);
        }
        report
    }

    async fn check_pipeline(&self, pipeline: &Pipeline) -> CycleReport {
        debug!(pipeline = %pipeline.name, "Checking pipeline for changes");
        let mut report = CycleReport::default();

        for material in &pipeline.materials {
            match self.check_material(pipeline, material).await {
                Ok(MaterialCheck::Triggered(_)) => report.triggered += 1,
                Ok(MaterialCheck::Unchanged) => report.unchanged += 1,
                Ok(MaterialCheck::Unsupported) => report.skipped += 1,
                Err(e) => {
                    warn!(pipeline = %pipeline.name, material = %material.uri, error = %e, "Material check failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn check_material(
        &self,
        pipeline: &Pipeline,
        material: &Material,
    ) -> Result<MaterialCheck> {
        let kind = material.kind();
        let Some(source) = self.sources.get(&kind) else {
            warn!(pipeline = %pipeline.name, material_type = %kind, "Unsupported material type, skipping");
            return Ok(MaterialCheck::Unsupported);
        };

        let revision = source.current_revision(material).await?;
        let key = material.watermark_key();
        let previous = self.store.get_watermark(&pipeline.name, &key).await?;

        if previous.as_deref() == Some(revision.as_str()) {
            debug!(pipeline = %pipeline.name, material = %key, revision = %revision, "Revision already built");
            return Ok(MaterialCheck::Unchanged);
        }

        info!(
            pipeline = %pipeline.name,
            material = %key,
            revision = %revision,
            previous = previous.as_deref().unwrap_or("<none>"),
            "New revision, triggering build"
        );
        let run_id = self
            .store
            .record_trigger(&pipeline.name, &key, &revision)
            .await?;
        self.dispatcher.dispatch(pipeline, run_id).await?;

        Ok(MaterialCheck::Triggered(run_id))
    }
}
