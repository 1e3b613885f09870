//! External scheduler dispatch (Nomad).
//!
//! Each triggered run becomes a Nomad batch job whose single task runs
//! `gypsy build` through the `gypsy` task driver. The task reports back
//! through the server's HTTP API.

use async_trait::async_trait;
use gypsy_core::{Error, Pipeline, Result, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::dispatch::Dispatcher;

const TASK_DRIVER: &str = "gypsy";
const CPU_MHZ: u32 = 1024;
const MEMORY_MB: u32 = 128;
const REGION: &str = "global";
const DATACENTER: &str = "dc1";
const PRIORITY: u8 = 50;

/// Nomad job description, serialized in the shape of the jobs API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalJob {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub region: String,
    pub priority: u8,
    pub datacenters: Vec<String>,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub task_groups: Vec<TaskGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,
    pub count: u32,
    pub tasks: Vec<Task>,
    pub restart_policy: RestartPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub name: String,
    pub driver: String,
    pub config: BTreeMap<String, String>,
    pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: u32,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: u32,
}

/// Durations are nanoseconds, as the jobs API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub attempts: u32,
    pub interval: u64,
    pub delay: u64,
    pub mode: String,
}

impl RestartPolicy {
    /// Nomad's default policy for batch jobs.
    pub fn batch() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(24 * 60 * 60).as_nanos() as u64,
            delay: Duration::from_secs(15).as_nanos() as u64,
            mode: "fail".to_string(),
        }
    }
}

impl ExternalJob {
    /// Map a pipeline and run onto a batch job.
    pub fn for_pipeline(pipeline: &Pipeline, run_id: RunId, server_url: &str) -> Self {
        let mut config = BTreeMap::new();
        config.insert("container".to_string(), pipeline.container.clone());
        config.insert("pipeline".to_string(), pipeline.name.clone());
        config.insert("run_id".to_string(), run_id.to_string());
        config.insert("server_url".to_string(), server_url.to_string());

        let task = Task {
            name: pipeline.name.clone(),
            driver: TASK_DRIVER.to_string(),
            config,
            resources: Resources {
                cpu: CPU_MHZ,
                memory_mb: MEMORY_MB,
            },
        };
        let group = TaskGroup {
            name: pipeline.name.clone(),
            count: 1,
            tasks: vec![task],
            restart_policy: RestartPolicy::batch(),
        };

        Self {
            id: format!("{}-{}", pipeline.name, run_id),
            name: pipeline.name.clone(),
            region: REGION.to_string(),
            priority: PRIORITY,
            datacenters: vec![DATACENTER.to_string()],
            job_type: "batch".to_string(),
            task_groups: vec![group],
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.id.is_empty() || self.id.contains(char::is_whitespace) {
            problems.push("job ID must be non-empty and contain no whitespace".to_string());
        }
        if self.name.is_empty() {
            problems.push("missing job name".to_string());
        }
        if self.region.is_empty() {
            problems.push("missing job region".to_string());
        }
        if self.datacenters.is_empty() {
            problems.push("missing job datacenters".to_string());
        }
        if !(1..=100).contains(&self.priority) {
            problems.push(format!("job priority must be between 1 and 100, got {}", self.priority));
        }
        if self.task_groups.is_empty() {
            problems.push("missing job task groups".to_string());
        }
        for group in &self.task_groups {
            if group.count == 0 {
                problems.push(format!("task group {} has count 0", group.name));
            }
            if group.tasks.is_empty() {
                problems.push(format!("task group {} has no tasks", group.name));
            }
            for task in &group.tasks {
                if task.driver.is_empty() {
                    problems.push(format!("task {} has no driver", task.name));
                }
                if task.resources.cpu == 0 || task.resources.memory_mb == 0 {
                    problems.push(format!("task {} has no resources", task.name));
                }
                for key in ["container", "pipeline", "run_id", "server_url"] {
                    if task.config.get(key).is_none_or(|v| v.is_empty()) {
                        problems.push(format!("task {} is missing config {}", task.name, key));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Dispatch(format!(
                "invalid job {}: {}",
                self.id,
                problems.join("; ")
            )))
        }
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "Job")]
    job: &'a ExternalJob,
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(rename = "EvalID", default)]
    eval_id: String,
}

/// Registers builds as Nomad batch jobs.
pub struct NomadDispatcher {
    client: reqwest::Client,
    nomad_addr: String,
    server_url: String,
}

impl NomadDispatcher {
    pub fn new(nomad_addr: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            nomad_addr: nomad_addr.into().trim_end_matches('/').to_string(),
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl Dispatcher for NomadDispatcher {
    async fn dispatch(&self, pipeline: &Pipeline, run_id: RunId) -> Result<()> {
        let job = ExternalJob::for_pipeline(pipeline, run_id, &self.server_url);
        job.validate()?;

        let url = format!("{}/v1/jobs", self.nomad_addr);
        debug!(url = %url, job = %job.id, "Registering Nomad job");

        let response = self
            .client
            .post(&url)
            .json(&RegisterRequest { job: &job })
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("failed to reach Nomad: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "Nomad rejected job {} ({}): {}",
                job.id,
                status,
                body.trim()
            )));
        }

        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("invalid Nomad response: {}", e)))?;

        info!(pipeline = %pipeline.name, run_id, job = %job.id, eval_id = %registered.eval_id, "Submitted Nomad job");
        Ok(())
    }
}
