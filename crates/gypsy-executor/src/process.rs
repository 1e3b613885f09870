//! Host process sandbox.
//!
//! Runs commands directly on the host inside a per-sandbox scratch
//! directory. There is no isolation beyond the cleared environment, so this
//! backend is only meant for development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use gypsy_core::sandbox::{CommandOutput, Sandbox, SandboxProvider};
use gypsy_core::{Error, Result};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::capture_output;

/// Creates [`ProcessSandbox`]es under a root directory.
#[derive(Debug, Clone)]
pub struct ProcessSandboxProvider {
    root: PathBuf,
}

impl ProcessSandboxProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxProvider for ProcessSandboxProvider {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn acquire(&self, base_image: &str) -> Result<Box<dyn Sandbox>> {
        let id = format!("gypsy-{}", Uuid::new_v4());
        let workspace = self.root.join(&id);

        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| Error::Provision(format!("failed to create {}: {}", workspace.display(), e)))?;

        info!(sandbox = %id, image = %base_image, workspace = %workspace.display(), "Acquired process sandbox");
        Ok(Box::new(ProcessSandbox { id, workspace }))
    }
}

/// A scratch directory on the host. Absolute sandbox paths resolve inside it.
#[derive(Debug)]
pub struct ProcessSandbox {
    id: String,
    workspace: PathBuf,
}

impl ProcessSandbox {
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Map a sandbox path onto the host. `..` components are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.workspace.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(Error::InvalidInput(format!(
                        "path '{}' escapes the sandbox",
                        path
                    )));
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: &str,
        env: &[(String, String)],
    ) -> Result<CommandOutput> {
        let cwd = self.resolve(working_dir)?;
        tokio::fs::create_dir_all(&cwd)
            .await
            .map_err(|e| Error::Execution(format!("failed to create {}: {}", cwd.display(), e)))?;

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .env_clear()
            .envs(env.iter().map(|(k, v)| {
                if k == "PWD" {
                    (k.as_str(), cwd.as_os_str())
                } else {
                    (k.as_str(), std::ffi::OsStr::new(v.as_str()))
                }
            }))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Execution(format!("failed to spawn '{}': {}", command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Execution("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Execution("stderr not captured".to_string()))?;

        let (captured, status) = tokio::join!(capture_output(stdout, stderr), child.wait());
        let (stdout, stderr) = captured?;
        let status =
            status.map_err(|e| Error::Execution(format!("failed to wait for '{}': {}", command, e)))?;

        // Killed by a signal: report the shell convention 128 + n.
        let exit_code = status.code().map(i64::from).unwrap_or_else(|| {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                status.signal().map(|s| 128 + i64::from(s)).unwrap_or(-1)
            }
            #[cfg(not(unix))]
            {
                -1
            }
        });

        debug!(sandbox = %self.id, command = %command, exit_code, "Command finished");
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let host_path = self.resolve(path)?;
        tokio::fs::read(&host_path)
            .await
            .map(Bytes::from)
            .map_err(|e| Error::Artifact(format!("failed to read {}: {}", path, e)))
    }

    async fn release(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.workspace).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Release(format!(
                    "failed to remove {}: {}",
                    self.workspace.display(),
                    e
                )));
            }
        }
        info!(sandbox = %self.id, "Released process sandbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gypsy_core::sandbox::{DEFAULT_WORKING_DIR, minimal_env};
    use tempfile::TempDir;

    async fn sandbox() -> (TempDir, Box<dyn Sandbox>) {
        let dir = TempDir::new().unwrap();
        let provider = ProcessSandboxProvider::new(dir.path());
        let sandbox = provider.acquire("ubuntu").await.unwrap();
        (dir, sandbox)
    }

    #[tokio::test]
    async fn test_echo() {
        let (_dir, sandbox) = sandbox().await;
        let output = sandbox
            .run_command("echo hi", DEFAULT_WORKING_DIR, &minimal_env())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(&output.stdout[..], b"hi\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let (_dir, sandbox) = sandbox().await;
        let output = sandbox
            .run_command("echo bad >&2; exit 3", DEFAULT_WORKING_DIR, &minimal_env())
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(&output.stderr[..], b"bad\n");
    }

    #[tokio::test]
    async fn test_environment_is_whitelisted() {
        // SAFETY: test-only variable, read by no other test.
        unsafe { std::env::set_var("GYPSY_PROCESS_TEST_LEAK", "1") };
        let (_dir, sandbox) = sandbox().await;
        let output = sandbox
            .run_command("env", DEFAULT_WORKING_DIR, &minimal_env())
            .await
            .unwrap();

        let env = String::from_utf8(output.stdout.to_vec()).unwrap();
        assert!(env.contains("LOGNAME=root"));
        assert!(!env.contains("GYPSY_PROCESS_TEST_LEAK"));
    }

    #[tokio::test]
    async fn test_working_dir_and_read_file() {
        let (_dir, sandbox) = sandbox().await;
        let env = minimal_env();
        sandbox
            .run_command("mkdir -p out && echo done > out/report.txt", "/src", &env)
            .await
            .unwrap();

        let data = sandbox.read_file("/src/out/report.txt").await.unwrap();
        assert_eq!(&data[..], b"done\n");
        assert!(matches!(
            sandbox.read_file("/src/missing").await,
            Err(Error::Artifact(_))
        ));
        assert!(matches!(
            sandbox.read_file("/../etc/passwd").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams() {
        let (_dir, sandbox) = sandbox().await;
        let output = sandbox
            .run_command(
                "i=0; while [ $i -lt 2000 ]; do echo out-$i; echo err-$i >&2; i=$((i+1)); done",
                DEFAULT_WORKING_DIR,
                &minimal_env(),
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.split(|b| *b == b'\n').count(), 2001);
        assert_eq!(output.stderr.split(|b| *b == b'\n').count(), 2001);
    }

    #[tokio::test]
    async fn test_release_removes_workspace() {
        let dir = TempDir::new().unwrap();
        let provider = ProcessSandboxProvider::new(dir.path());
        let sandbox = provider.acquire("ubuntu").await.unwrap();
        let workspace = dir.path().join(sandbox.id());
        assert!(workspace.exists());

        sandbox.release().await.unwrap();
        assert!(!workspace.exists());
        sandbox.release().await.unwrap();
    }
}
