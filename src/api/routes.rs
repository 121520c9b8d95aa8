use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{llm, query, schema, AppState};

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/query", post(query::translate_and_run))
        .route("/api/schema", get(schema::get_schema))
        .route("/api/llm/status", get(llm::llm_status))
        .route("/api/llm/test", get(llm::llm_test))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
