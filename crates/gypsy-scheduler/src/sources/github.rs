//! GitHub materials, resolved through the git refs API.

use async_trait::async_trait;
use gypsy_core::{Error, Material, Result, RevisionSource};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_API: &str = "https://api.github.com";

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

/// Resolves `owner/repo` materials to the head commit of their branch.
pub struct GithubSource {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubSource {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(DEFAULT_API, token)
    }

    pub fn with_api_base(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn ref_url(&self, material: &Material) -> Result<String> {
        let repo = material.uri.trim_matches('/');
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(format!(
                    "{}/repos/{}/{}/git/ref/heads/{}",
                    self.api_base,
                    owner,
                    name,
                    material.branch()
                ))
            }
            _ => Err(Error::InvalidInput(format!(
                "github material uri must be owner/repo, got '{}'",
                material.uri
            ))),
        }
    }
}

#[async_trait]
impl RevisionSource for GithubSource {
    async fn current_revision(&self, material: &Material) -> Result<String> {
        let url = self.ref_url(material)?;
        debug!(url = %url, "Fetching GitHub ref");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "gypsy")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("GitHub request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "GitHub returned {} for {}",
                response.status(),
                material.uri
            )));
        }

        let git_ref: GitRef = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("invalid GitHub response: {}", e)))?;
        Ok(git_ref.object.sha)
    }
}
