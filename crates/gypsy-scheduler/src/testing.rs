//! In-memory collaborators shared by the scheduler tests.

use async_trait::async_trait;
use bytes::Bytes;
use gypsy_core::sandbox::{CommandOutput, Sandbox, SandboxProvider};
use gypsy_core::{Error, Material, Pipeline, Result, RevisionSource, Run, RunId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::BuildBackend;
use crate::dispatch::Dispatcher;

#[derive(Default)]
pub struct MemoryBackend {
    pipelines: Mutex<HashMap<String, Pipeline>>,
    runs: Mutex<Vec<Run>>,
    artifacts: Mutex<HashMap<(String, RunId, String), Vec<u8>>>,
}

impl MemoryBackend {
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        let backend = Self::default();
        backend
            .pipelines
            .lock()
            .unwrap()
            .insert(pipeline.name.clone(), pipeline);
        backend
    }

    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    pub fn artifact(&self, pipeline: &str, run: RunId, name: &str) -> Option<Vec<u8>> {
        self.artifacts
            .lock()
            .unwrap()
            .get(&(pipeline.to_string(), run, name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl BuildBackend for MemoryBackend {
    async fn fetch_pipeline(&self, name: &str) -> Result<Pipeline> {
        self.pipelines
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pipeline {}", name)))
    }

    async fn store_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> Result<()> {
        self.artifacts
            .lock()
            .unwrap()
            .insert((pipeline.to_string(), run, name.to_string()), data.to_vec());
        Ok(())
    }

    async fn record_run(&self, run: &Run) -> Result<()> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SandboxLog {
    acquired: AtomicUsize,
    released: AtomicBool,
    executed: Mutex<Vec<String>>,
    working_dirs: Mutex<Vec<String>>,
    env_keys: Mutex<Vec<String>>,
}

/// Sandbox provider answering commands from a fixed table. Commands not in
/// the table fail to execute.
#[derive(Default)]
pub struct ScriptedProvider {
    commands: HashMap<String, (i64, String, String)>,
    files: HashMap<String, Vec<u8>>,
    fail_acquire: bool,
    fail_release: bool,
    log: Arc<SandboxLog>,
}

impl ScriptedProvider {
    pub fn command(mut self, command: &str, exit_code: i64, stdout: &str, stderr: &str) -> Self {
        self.commands.insert(
            command.to_string(),
            (exit_code, stdout.to_string(), stderr.to_string()),
        );
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.insert(path.to_string(), data.to_vec());
        self
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn acquired(&self) -> usize {
        self.log.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.log.released.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.executed.lock().unwrap().clone()
    }

    pub fn working_dirs(&self) -> Vec<String> {
        self.log.working_dirs.lock().unwrap().clone()
    }

    pub fn env_keys(&self) -> Vec<String> {
        self.log.env_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn acquire(&self, base_image: &str) -> Result<Box<dyn Sandbox>> {
        if self.fail_acquire {
            return Err(Error::Provision(format!("no such image {}", base_image)));
        }
        self.log.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSandbox {
            commands: self.commands.clone(),
            files: self.files.clone(),
            fail_release: self.fail_release,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSandbox {
    commands: HashMap<String, (i64, String, String)>,
    files: HashMap<String, Vec<u8>>,
    fail_release: bool,
    log: Arc<SandboxLog>,
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn id(&self) -> &str {
        "scripted-0"
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: &str,
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        self.log.executed.lock().unwrap().push(command.to_string());
        self.log
            .working_dirs
            .lock()
            .unwrap()
            .push(working_dir.to_string());
        *self.log.env_keys.lock().unwrap() = env.iter().map(|(k, _)| k.clone()).collect();

        let (exit_code, stdout, stderr) = self
            .commands
            .get(command)
            .cloned()
            .ok_or_else(|| Error::Execution(format!("unknown command '{}'", command)))?;
        Ok(CommandOutput {
            exit_code,
            stdout: Bytes::from(stdout),
            stderr: Bytes::from(stderr),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.files
            .get(path)
            .map(|data| Bytes::from(data.clone()))
            .ok_or_else(|| Error::Artifact(format!("no such file {}", path)))
    }

    async fn release(&self) -> Result<()> {
        self.log.released.store(true, Ordering::SeqCst);
        if self.fail_release {
            return Err(Error::Release("destroy: device busy".to_string()));
        }
        Ok(())
    }
}

/// Revision source answering from a mutable table keyed by URI.
#[derive(Default)]
pub struct FixedSource {
    revisions: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl FixedSource {
    pub fn set(&self, uri: &str, revision: &str) {
        self.revisions
            .lock()
            .unwrap()
            .insert(uri.to_string(), revision.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevisionSource for FixedSource {
    async fn current_revision(&self, material: &Material) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.revisions
            .lock()
            .unwrap()
            .get(&material.uri)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("{} unreachable", material.uri)))
    }
}

/// Dispatcher recording what it was asked to run.
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<(String, RunId)>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn dispatched(&self) -> Vec<(String, RunId)> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, pipeline: &Pipeline, run_id: RunId) -> Result<()> {
        self.dispatched
            .lock()
            .unwrap()
            .push((pipeline.name.clone(), run_id));
        if self.fail {
            return Err(Error::Dispatch("scheduler unavailable".to_string()));
        }
        Ok(())
    }
}
