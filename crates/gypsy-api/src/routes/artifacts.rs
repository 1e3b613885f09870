//! Artifact endpoints. Bodies are raw bytes.

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use gypsy_core::RunId;
use gypsy_store::ArtifactRepo;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

const MAX_ARTIFACT_BYTES: usize = 1024 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{name}/runs/{id}/artifacts", get(list_artifacts))
        .route(
            "/{name}/runs/{id}/artifacts/{artifact}",
            get(download_artifact)
                .post(upload_artifact)
                .delete(delete_artifact),
        )
        .layer(DefaultBodyLimit::max(MAX_ARTIFACT_BYTES))
}

async fn list_artifacts(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, RunId)>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_artifacts(&name, id).await?))
}

async fn download_artifact(
    State(state): State<AppState>,
    Path((name, id, artifact)): Path<(String, RunId, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.store.get_artifact(&name, id, &artifact).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

async fn upload_artifact(
    State(state): State<AppState>,
    Path((name, id, artifact)): Path<(String, RunId, String)>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let size = body.len();
    state.store.put_artifact(&name, id, &artifact, body).await?;
    info!(pipeline = %name, run_id = id, artifact = %artifact, size, "Stored artifact");
    Ok(StatusCode::CREATED)
}

async fn delete_artifact(
    State(state): State<AppState>,
    Path((name, id, artifact)): Path<(String, RunId, String)>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_artifact(&name, id, &artifact).await?;
    Ok(StatusCode::NO_CONTENT)
}
