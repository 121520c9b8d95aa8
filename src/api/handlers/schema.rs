use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::api::handlers::AppState;

/// Resolved schema plus where it came from. `?refresh=true` drops the cached
/// schema first.
pub async fn get_schema(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    if params.get("refresh").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        tracing::info!("Schema refresh requested, dropping cached schema");
        state.schema_provider.invalidate().await;
    }

    let schema = state.schema_provider.get_schema().await;

    Json(serde_json::json!({
        "tableCount": schema.tables.len(),
        "tableNames": schema.table_names(),
        "origin": schema.origin,
        "liveStoreConfigured": state.config.database.url.is_some(),
        "retrievedAt": schema.retrieved_at,
        "schema": schema.tables,
    }))
}
