//! Docker sandbox implementation.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::ContainerInspectResponse;
use bytes::Bytes;
use futures::StreamExt;
use gypsy_core::sandbox::{CommandOutput, DEFAULT_READY_TIMEOUT, Sandbox, SandboxProvider};
use gypsy_core::{Error, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::capture_output;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PIPE_CAPACITY: usize = 64 * 1024;

/// Keeps the container alive until it is stopped.
const IDLE_SCRIPT: &str = "trap 'exit 0' TERM; while :; do sleep 1; done";

/// Creates a fresh container per build from the pipeline's base image.
pub struct DockerSandboxProvider {
    docker: Docker,
    ready_timeout: Duration,
}

impl DockerSandboxProvider {
    /// Create a provider connecting to the local Docker daemon.
    pub fn new(ready_timeout: Duration) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Provision(format!("failed to connect to Docker: {}", e)))?;
        Ok(Self {
            docker,
            ready_timeout,
        })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    fn container_name(id: &Uuid) -> String {
        format!("gypsy-{}", id)
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut pull = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(Error::Provision(format!("failed to pull {}: {}", image, e)));
                }
            }
        }
        Ok(())
    }

    async fn create_and_start(&self, name: &str, image: &str) -> Result<()> {
        let config = Config {
            image: Some(image.to_string()),
            entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            cmd: Some(vec![IDLE_SCRIPT.to_string()]),
            tty: Some(false),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        info!(container = %name, image = %image, "Creating container");
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| Error::Provision(format!("failed to create container: {}", e)))?;

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Provision(format!("failed to start container: {}", e)))?;
        Ok(())
    }

    /// Poll until the container has an IP address.
    async fn wait_until_ready(&self, name: &str) -> Result<String> {
        let poll = async {
            loop {
                let inspect = self
                    .docker
                    .inspect_container(name, None)
                    .await
                    .map_err(|e| Error::Provision(format!("failed to inspect container: {}", e)))?;

                if let Some(ip) = container_ip(&inspect) {
                    return Ok(ip);
                }
                let running = inspect
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                if !running {
                    return Err(Error::Provision(format!("container {} exited", name)));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(self.ready_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::Provision(format!(
                "container {} not ready after {:?}",
                name, self.ready_timeout
            ))),
        }
    }
}

#[async_trait]
impl SandboxProvider for DockerSandboxProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn acquire(&self, base_image: &str) -> Result<Box<dyn Sandbox>> {
        self.ensure_image(base_image).await?;

        let name = Self::container_name(&Uuid::new_v4());
        let ready = match self.create_and_start(&name, base_image).await {
            Ok(()) => self.wait_until_ready(&name).await,
            Err(e) => Err(e),
        };

        match ready {
            Ok(ip) => {
                info!(container = %name, ip = %ip, "Container ready");
                Ok(Box::new(DockerSandbox {
                    docker: self.docker.clone(),
                    name,
                }))
            }
            Err(e) => {
                warn!(container = %name, error = %e, "Provisioning failed, destroying container");
                if let Err(cleanup) = remove_container(&self.docker, &name).await {
                    warn!(container = %name, error = %cleanup, "Cleanup after failed provisioning failed");
                }
                Err(e)
            }
        }
    }
}

/// A running build container.
pub struct DockerSandbox {
    docker: Docker,
    name: String,
}

impl DockerSandbox {
    async fn exec(
        &self,
        cmd: Vec<String>,
        working_dir: Option<&str>,
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        let options = CreateExecOptions {
            cmd: Some(cmd),
            env: Some(format_env(env)),
            working_dir: working_dir.map(str::to_string),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&self.name, options)
            .await
            .map_err(|e| Error::Execution(format!("failed to create exec: {}", e)))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::Execution(format!("failed to start exec: {}", e)))?;

        let (stdout, stderr) = match started {
            StartExecResults::Attached { mut output, .. } => {
                let (mut out_w, out_r) = tokio::io::duplex(PIPE_CAPACITY);
                let (mut err_w, err_r) = tokio::io::duplex(PIPE_CAPACITY);

                // Split the multiplexed stream into two pipes.
                let demux = tokio::spawn(async move {
                    while let Some(chunk) = output.next().await {
                        let written = match chunk {
                            Ok(LogOutput::StdErr { message }) => err_w.write_all(&message).await,
                            Ok(LogOutput::StdOut { message })
                            | Ok(LogOutput::Console { message }) => {
                                out_w.write_all(&message).await
                            }
                            Ok(LogOutput::StdIn { .. }) => Ok(()),
                            Err(e) => return Err(e.to_string()),
                        };
                        written.map_err(|e| e.to_string())?;
                    }
                    Ok::<(), String>(())
                });

                let captured = capture_output(out_r, err_r).await;
                match demux.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        return Err(Error::Execution(format!("exec stream failed: {}", e)));
                    }
                    Err(e) => {
                        return Err(Error::Execution(format!("exec stream panicked: {}", e)));
                    }
                }
                captured?
            }
            StartExecResults::Detached => (Bytes::new(), Bytes::new()),
        };

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::Execution(format!("failed to inspect exec: {}", e)))?;
        let exit_code = inspect
            .exit_code
            .ok_or_else(|| Error::Execution("exec finished without exit code".to_string()))?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: &str,
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        let cmd = vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()];
        let output = self.exec(cmd, Some(working_dir), env).await?;
        debug!(container = %self.name, command = %command, exit_code = output.exit_code, "Command finished");
        Ok(output)
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let cmd = vec!["cat".to_string(), "--".to_string(), path.to_string()];
        let output = self
            .exec(cmd, None, &[])
            .await
            .map_err(|e| Error::Artifact(e.to_string()))?;
        if !output.success() {
            return Err(Error::Artifact(format!(
                "failed to read {}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )));
        }
        Ok(output.stdout)
    }

    async fn release(&self) -> Result<()> {
        let stop = self
            .docker
            .stop_container(&self.name, Some(StopContainerOptions { t: 5 }));
        let destroy = remove_container(&self.docker, &self.name);

        stop_then_destroy(&self.name, stop, destroy).await?;
        info!(container = %self.name, "Released container");
        Ok(())
    }
}

/// Run `stop`, then `destroy` whatever `stop` returned. Failures of both
/// phases end up in one release error.
async fn stop_then_destroy<E, S, D>(name: &str, stop: S, destroy: D) -> Result<()>
where
    E: std::fmt::Display,
    S: Future<Output = std::result::Result<(), E>>,
    D: Future<Output = std::result::Result<(), E>>,
{
    let mut failures = Vec::new();
    if let Err(e) = stop.await {
        failures.push(format!("stop: {}", e));
    }
    if let Err(e) = destroy.await {
        failures.push(format!("destroy: {}", e));
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Release(format!("{}: {}", name, failures.join("; "))))
    }
}

async fn remove_container(docker: &Docker, name: &str) -> std::result::Result<(), bollard::errors::Error> {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    docker.remove_container(name, Some(options)).await
}

/// First IP address found in the container's network settings.
fn container_ip(inspect: &ContainerInspectResponse) -> Option<String> {
    let settings = inspect.network_settings.as_ref()?;
    if let Some(ip) = settings.ip_address.as_ref().filter(|ip| !ip.is_empty()) {
        return Some(ip.clone());
    }
    settings
        .networks
        .as_ref()?
        .values()
        .filter_map(|n| n.ip_address.as_ref())
        .find(|ip| !ip.is_empty())
        .cloned()
}

fn format_env(env: &[(String, String)]) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
}


/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use gypsy_core::sandbox::{DEFAULT_WORKING_DIR, minimal_env};

    #[tokio::test]
    #[ignore]
    async fn test_sandbox_lifecycle() {
        let provider = DockerSandboxProvider::new(DEFAULT_READY_TIMEOUT).unwrap();
        let sandbox = provider.acquire("alpine:latest").await.unwrap();
        let env = minimal_env();

        let hi = sandbox
            .run_command("echo hi", DEFAULT_WORKING_DIR, &env)
            .await
            .unwrap();
        assert!(hi.success());
        assert_eq!(&hi.stdout[..], b"hi\n");

        let failed = sandbox
            .run_command("false", DEFAULT_WORKING_DIR, &env)
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 1);

        sandbox.release().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_environment_and_files() {
        let provider = DockerSandboxProvider::new(DEFAULT_READY_TIMEOUT).unwrap();
        let sandbox = provider.acquire("alpine:latest").await.unwrap();

        let output = sandbox
            .run_command(
                "env; echo report > report.txt",
                DEFAULT_WORKING_DIR,
                &minimal_env(),
            )
            .await
            .unwrap();
        let env = String::from_utf8_lossy(&output.stdout);
        assert!(env.contains("LANGUAGE=en_US"));
        assert!(!env.contains("HOSTNAME_LEAK"));

        let data = sandbox.read_file("/root/report.txt").await.unwrap();
        assert_eq!(&data[..], b"report\n");
        assert!(sandbox.read_file("/root/missing").await.is_err());

        sandbox.release().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_missing_image_fails_provisioning() {
        let provider = DockerSandboxProvider::new(Duration::from_secs(5)).unwrap();
        let err = provider
            .acquire("gypsy-does-not-exist:never")
            .await
            .err()
            .unwrap();
        assert!(err.precedes_run());
    }
}
