//! HTTP client for the gypsy API.

use async_trait::async_trait;
use bytes::Bytes;
use gypsy_core::{Pipeline, Run, RunId};
use gypsy_scheduler::BuildBackend;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url '{0}': {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("server url '{0}' cannot take a path")]
    NotABase(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid pipeline from server: {0}")]
    Pipeline(#[from] gypsy_config::ConfigError),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct SavedPipeline {
    name: String,
}

/// Thin wrapper over the REST surface served by `gypsy server`.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(server_url: &str) -> ClientResult<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| ClientError::InvalidUrl(server_url.to_string(), e))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::NotABase(server_url.to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::NotABase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        if status == StatusCode::NOT_FOUND {
            Err(ClientError::NotFound(message))
        } else {
            Err(ClientError::Status { status, message })
        }
    }

    pub async fn list_pipelines(&self) -> ClientResult<Vec<String>> {
        let response = self.http.get(self.url(&["pipelines"])?).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Pipeline definition as the server renders it.
    pub async fn pipeline_yaml(&self, name: &str) -> ClientResult<String> {
        let response = self
            .http
            .get(self.url(&["pipelines", name])?)
            .send()
            .await?;
        Ok(Self::check(response).await?.text().await?)
    }

    pub async fn get_pipeline(&self, name: &str) -> ClientResult<Pipeline> {
        let yaml = self.pipeline_yaml(name).await?;
        Ok(gypsy_config::parse_pipeline(&yaml)?)
    }

    /// Create or replace a pipeline from YAML. Returns its name.
    pub async fn save_pipeline(&self, yaml: String) -> ClientResult<String> {
        let response = self
            .http
            .post(self.url(&["pipelines"])?)
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(yaml)
            .send()
            .await?;
        let saved: SavedPipeline = Self::check(response).await?.json().await?;
        Ok(saved.name)
    }

    pub async fn delete_pipeline(&self, name: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.url(&["pipelines", name])?)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn list_runs(&self, pipeline: &str) -> ClientResult<Vec<RunId>> {
        let response = self
            .http
            .get(self.url(&["pipelines", pipeline, "runs"])?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn get_run(&self, pipeline: &str, id: RunId) -> ClientResult<Run> {
        let response = self
            .http
            .get(self.url(&["pipelines", pipeline, "runs", &id.to_string()])?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn post_run(&self, run: &Run) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url(&["pipelines", &run.pipeline_name, "runs", &run.id.to_string()])?)
            .json(run)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn list_artifacts(&self, pipeline: &str, id: RunId) -> ClientResult<Vec<String>> {
        let response = self
            .http
            .get(self.url(&["pipelines", pipeline, "runs", &id.to_string(), "artifacts"])?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn get_artifact(&self, pipeline: &str, id: RunId, name: &str) -> ClientResult<Bytes> {
        let response = self
            .http
            .get(self.url(&["pipelines", pipeline, "runs", &id.to_string(), "artifacts", name])?)
            .send()
            .await?;
        Ok(Self::check(response).await?.bytes().await?)
    }

    pub async fn put_artifact(
        &self,
        pipeline: &str,
        id: RunId,
        name: &str,
        data: Bytes,
    ) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url(&["pipelines", pipeline, "runs", &id.to_string(), "artifacts", name])?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Build backend that reports to a remote server.
///
/// Used by externally scheduled jobs, which have no access to the store.
pub struct HttpBackend {
    client: ApiClient,
}

impl HttpBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BuildBackend for HttpBackend {
    async fn fetch_pipeline(&self, name: &str) -> gypsy_core::Result<Pipeline> {
        self.client
            .get_pipeline(name)
            .await
            .map_err(|e| gypsy_core::Error::Fetch(format!("{}: {}", name, e)))
    }

    async fn store_artifact(
        &self,
        pipeline: &str,
        run: RunId,
        name: &str,
        data: Bytes,
    ) -> gypsy_core::Result<()> {
        self.client
            .put_artifact(pipeline, run, name, data)
            .await
            .map_err(|e| gypsy_core::Error::Artifact(format!("{}: {}", name, e)))
    }

    async fn record_run(&self, run: &Run) -> gypsy_core::Result<()> {
        self.client
            .post_run(run)
            .await
            .map_err(|e| gypsy_core::Error::Store(e.to_string()))
    }
}
