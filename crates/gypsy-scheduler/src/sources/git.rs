//! Plain git materials, resolved with `git ls-remote`.

use async_trait::async_trait;
use gypsy_core::{Error, Material, Result, RevisionSource};
use tokio::process::Command;
use tracing::debug;

/// Resolves any git remote through the `git` binary on the host.
pub struct GitSource {
    git: String,
}

impl GitSource {
    pub fn new() -> Self {
        Self {
            git: "git".to_string(),
        }
    }
}

impl Default for GitSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Commit of `refs/heads/<branch>` in `git ls-remote` output.
fn parse_ls_remote(output: &str, branch: &str) -> Option<String> {
    let wanted = format!("refs/heads/{}", branch);
    output.lines().find_map(|line| {
        let (sha, name) = line.split_once('\t')?;
        (name.trim() == wanted && !sha.is_empty()).then(|| sha.trim().to_string())
    })
}

#[async_trait]
impl RevisionSource for GitSource {
    async fn current_revision(&self, material: &Material) -> Result<String> {
        let branch = material.branch();
        debug!(uri = %material.uri, branch = %branch, "Running git ls-remote");

        let output = Command::new(&self.git)
            .arg("ls-remote")
            .arg("--heads")
            .arg(&material.uri)
            .arg(format!("refs/heads/{}", branch))
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| Error::Fetch(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Fetch(format!(
                "git ls-remote {} failed: {}",
                material.uri,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ls_remote(&stdout, branch).ok_or_else(|| {
            Error::Fetch(format!("branch {} not found in {}", branch, material.uri))
        })
    }
}
