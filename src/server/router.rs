use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{config, documents, health, index, threads};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Creates the application router: health, threads, documents, index,
/// config, and the chat WebSocket.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/config", get(config::get_config))
        .route(
            "/api/threads",
            get(threads::list_threads).post(threads::create_thread),
        )
        .route(
            "/api/threads/:thread_id/messages",
            get(threads::get_thread_messages).post(threads::post_thread_message),
        )
        .route(
            "/api/documents",
            get(documents::list_documents)
                .post(documents::upload_documents)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/index", get(index::get_index_status))
        .route("/api/index/rebuild", post(index::rebuild_index))
        .route("/ws", get(ws_handler))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let origins = if configured.is_empty() {
        default_local_origins()
    } else {
        configured.to_vec()
    };

    let allowed_origins = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origin_list_falls_back_to_local_defaults() {
        assert!(default_local_origins()
            .iter()
            .all(|origin| origin.starts_with("http://localhost") || origin.starts_with("http://127.0.0.1")));
        // Building must not panic on odd entries.
        let _ = build_cors_layer(&["http://example.com".to_string(), "bad\norigin".to_string()]);
    }
}
