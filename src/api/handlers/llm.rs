use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::services::llm_service::{self, LlmStatus};

/// Credential presence plus a one-shot probe. Never fails.
pub async fn llm_status(State(state): State<AppState>) -> Json<LlmStatus> {
    Json(llm_service::check_status(state.llm.as_ref()).await)
}

/// Ask the model for a greeting
pub async fn llm_test(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let response = state
        .llm
        .generate("Say hello in one short sentence.")
        .await?;

    Ok(Json(serde_json::json!({
        "model": state.config.llm.model,
        "response": response,
    })))
}
