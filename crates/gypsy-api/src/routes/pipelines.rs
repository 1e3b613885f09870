//! Pipeline endpoints. Pipelines travel as YAML.

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gypsy_config::{parse_pipeline, render_pipeline};
use gypsy_store::PipelineRepo;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_pipelines).post(save_pipeline).put(save_pipeline),
        )
        .route(
            "/{name}",
            get(show_pipeline).put(update_pipeline).delete(delete_pipeline),
        )
}

async fn list_pipelines(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_pipelines().await?))
}

async fn show_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.store.get_pipeline(&name).await?;
    let yaml = render_pipeline(&pipeline)?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], yaml))
}

async fn save_pipeline(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = parse_pipeline(&body)?;
    state.store.put_pipeline(&pipeline).await?;
    info!(pipeline = %pipeline.name, "Saved pipeline");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "name": pipeline.name })),
    ))
}

async fn update_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = parse_pipeline(&body)?;
    if pipeline.name != name {
        return Err(ApiError::BadRequest(format!(
            "pipeline name '{}' does not match '{}'",
            pipeline.name, name
        )));
    }
    state.store.put_pipeline(&pipeline).await?;
    info!(pipeline = %name, "Updated pipeline");
    Ok(Json(serde_json::json!({ "name": name })))
}

async fn delete_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_pipeline(&name).await?;
    info!(pipeline = %name, "Deleted pipeline");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, send};
    use axum::http::{Method, StatusCode};

    const DEMO: &str = "name: demo\ncontainer: ubuntu\nscripts:\n  - command: echo hi\n  - command: 'false'\n";

    #[tokio::test]
    async fn test_create_show_list_delete() {
        let (_dir, app, _store) = app();

        let (status, _) = send(&app, Method::POST, "/pipelines", DEMO).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::GET, "/pipelines", "").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names, vec!["demo"]);

        let (status, body) = send(&app, Method::GET, "/pipelines/demo", "").await;
        assert_eq!(status, StatusCode::OK);
        let pipeline = gypsy_config::parse_pipeline(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(pipeline.scripts.len(), 2);
        assert_eq!(pipeline.scripts[1].command, "false");

        let (status, _) = send(&app, Method::DELETE, "/pipelines/demo", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/pipelines/demo", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_by_name_must_match() {
        let (_dir, app, _store) = app();

        let (status, _) = send(&app, Method::PUT, "/pipelines/demo", DEMO).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::PUT, "/pipelines/other", DEMO).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("does not match"));
    }

    #[tokio::test]
    async fn test_invalid_yaml_rejected() {
        let (_dir, app, _store) = app();
        let (status, _) = send(&app, Method::POST, "/pipelines", "name: [oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::PUT, "/pipelines", "name: demo\n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let (_dir, app, _store) = app();
        let (status, body) = send(&app, Method::DELETE, "/pipelines/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("nope"));
    }
}
