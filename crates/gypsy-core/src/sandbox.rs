//! Sandbox traits and command output.
//!
//! Sandboxes are disposable, isolated environments (containers, scratch
//! directories) that build commands run in. They know nothing about
//! pipelines or storage.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::Result;

/// Working directory used when a script does not declare one.
pub const DEFAULT_WORKING_DIR: &str = "/root";

/// How long `acquire` waits for a sandbox to become network-addressable.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// The only environment visible to commands inside a sandbox.
pub fn minimal_env() -> Vec<(String, String)> {
    [
        ("SHELL", "/bin/bash"),
        ("USER", "root"),
        (
            "PATH",
            "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
        ),
        ("PWD", DEFAULT_WORKING_DIR),
        ("LANG", "en_US.UTF-8"),
        ("LANGUAGE", "en_US"),
        ("HOME", DEFAULT_WORKING_DIR),
        ("LOGNAME", "root"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A running sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Unique identifier of this sandbox (container name, directory name).
    fn id(&self) -> &str;

    /// Run one command line and capture both output streams.
    ///
    /// Returns `Ok` for any exit status; only failures to invoke the command
    /// or to talk to the sandbox are errors.
    async fn run_command(
        &self,
        command: &str,
        working_dir: &str,
        env: &[(String, String)],
    ) -> Result<CommandOutput>;

    /// Read a file out of the sandbox.
    async fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Stop and destroy the sandbox. Both phases are always attempted.
    async fn release(&self) -> Result<()>;
}

/// Creates sandboxes from base images.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Clone `base_image` under a fresh identifier, start it and wait until
    /// it is ready.
    async fn acquire(&self, base_image: &str) -> Result<Box<dyn Sandbox>>;
}
