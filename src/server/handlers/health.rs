use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// Liveness plus whether the document index is loaded. Never touches the
/// model, so it answers even when the LLM endpoint is down.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index = match state.knowledge.status().await {
        Ok(report) => json!({
            "exists": report.exists,
            "loaded": report.loaded,
            "chunk_count": report.meta.chunk_count,
        }),
        Err(err) => json!({ "error": err.to_string() }),
    };

    Json(json!({
        "status": "ok",
        "model": state.settings.llm.model,
        "tools": state.tools.names(),
        "index": index,
    }))
}
