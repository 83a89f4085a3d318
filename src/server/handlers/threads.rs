use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::history::{validate_thread_id, ConversationStore};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
}

pub async fn list_threads(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let threads = state.history.list_thread_summaries().await?;
    Ok(Json(json!({ "threads": threads })))
}

/// Hands out a fresh id; the thread is persisted with its first message.
pub async fn create_thread() -> impl IntoResponse {
    Json(json!({ "threadId": Uuid::new_v4().to_string() }))
}

pub async fn get_thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_thread_id(&thread_id)?;
    let messages = state.history.load(&thread_id).await?;
    Ok(Json(json!({ "threadId": thread_id, "messages": messages })))
}

/// Runs a full turn and returns its outcome in one response. The turn runs
/// on its own task, so a client that disconnects does not cut it short.
pub async fn post_thread_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (mut events, turn) = state.agent.spawn_turn(thread_id, payload.message);
    // Events are only needed by streaming callers.
    while events.recv().await.is_some() {}

    let outcome = turn.await.map_err(ApiError::internal)??;
    Ok(Json(outcome))
}
