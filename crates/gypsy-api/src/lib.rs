//! HTTP API for the gypsy run and artifact store.
//!
//! Remote builders fetch pipelines and report runs and artifacts through
//! these endpoints; the CLI uses them for everything else.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// The full application with request tracing.
pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}
