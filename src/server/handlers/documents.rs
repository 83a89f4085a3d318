use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.knowledge.list_documents().await?;
    Ok(Json(json!({ "documents": documents })))
}

/// Saves every file part of the form. Names already in the document folder
/// are skipped; anything new invalidates the index.
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        files.push((name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("no files in upload".to_string()));
    }

    let report = state.knowledge.save_uploads(files).await?;
    tracing::info!(
        "Uploaded {} document(s), skipped {}",
        report.saved.len(),
        report.skipped.len()
    );
    Ok(Json(report))
}
