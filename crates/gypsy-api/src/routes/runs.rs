//! Run endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use gypsy_core::{Run, RunId};
use gypsy_store::RunRepo;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{name}/runs", get(list_runs))
        .route(
            "/{name}/runs/{id}",
            get(show_run).post(record_run).delete(delete_run),
        )
}

async fn list_runs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<RunId>>, ApiError> {
    Ok(Json(state.store.list_runs(&name).await?))
}

async fn show_run(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, RunId)>,
) -> Result<Json<Run>, ApiError> {
    Ok(Json(state.store.get_run(&name, id).await?))
}

/// Final report of a run. The path decides where it lands.
///
/// The body is JSON whatever the content type says; builders post it bare.
async fn record_run(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, RunId)>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let run: Run = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid run: {}", e)))?;
    if run.pipeline_name != name || run.id != id {
        return Err(ApiError::BadRequest(format!(
            "run {}/{} posted to {}/{}",
            run.pipeline_name, run.id, name, id
        )));
    }
    state.store.put_run(&run).await?;
    info!(pipeline = %name, run_id = id, success = run.success, "Recorded run");
    Ok(StatusCode::CREATED)
}

async fn delete_run(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, RunId)>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_run(&name, id).await?;
    info!(pipeline = %name, run_id = id, "Deleted run");
    Ok(StatusCode::NO_CONTENT)
}
