use axum::{extract::State, http::StatusCode, Json};

use crate::api::handlers::AppState;
use crate::models::{NaturalLanguageQueryRequest, QueryResponse};

/// Translate a natural-language question into SQL, run it and explain the result.
///
/// Always answers with a `QueryResponse`; only a blank question is a client error.
pub async fn translate_and_run(
    State(state): State<AppState>,
    Json(payload): Json<NaturalLanguageQueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let question = payload.question.unwrap_or_default();
    tracing::info!("Received natural language query ({} chars)", question.len());

    let response = state.pipeline.translate_and_run(&question).await;
    let status = if question.trim().is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    (status, Json(response))
}
