//! API routes.

pub mod artifacts;
pub mod health;
pub mod pipelines;
pub mod runs;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/pipelines",
            pipelines::router()
                .merge(runs::router())
                .merge(artifacts::router()),
        )
        .merge(health::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{Method, Request, StatusCode};
    use gypsy_config::ArtifactStorage;
    use gypsy_store::RedbStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) fn app() -> (TempDir, Router, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(
            dir.path().join("gypsy.db"),
            dir.path().join("artifacts"),
            ArtifactStorage::Files,
        )
        .unwrap();
        let router = router(AppState::new(store.clone()));
        (dir, router, store)
    }

    pub(crate) async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: impl Into<Body>,
    ) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }
}
