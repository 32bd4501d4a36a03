pub mod error;
pub mod handlers;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::require_workspace;

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/decks/{id}/export", post(handlers::submit_export))
        .route("/exports/{id}", get(handlers::get_export))
        .route("/exports/{id}/events", get(handlers::stream_export_events))
        .route("/exports/{id}/download", get(handlers::download_export))
        .with_state(state)
        .layer(axum_middleware::from_fn(require_workspace))
}
