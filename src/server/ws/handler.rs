use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::protocol::WsIncomingMessage;
use crate::core::errors::ApiError;
use crate::history::{validate_thread_id, ConversationStore};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut current_thread: Option<String> = None;

    // Turns run one at a time per connection; frames that arrive meanwhile
    // wait in the socket buffer.
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let result = match serde_json::from_str::<WsIncomingMessage>(&text) {
            Ok(incoming) => handle_message(&mut sender, &state, &mut current_thread, incoming).await,
            Err(err) => Err(ApiError::BadRequest(format!("invalid frame: {}", err))),
        };

        if let Err(err) = result {
            let frame = error_frame(current_thread.as_deref(), &err.to_string());
            if send_json(&mut sender, &frame).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("WebSocket closed (thread {:?})", current_thread);
}

async fn handle_message(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    current_thread: &mut Option<String>,
    incoming: WsIncomingMessage,
) -> Result<(), ApiError> {
    match incoming {
        WsIncomingMessage::SetThread { thread_id } => {
            validate_thread_id(&thread_id)?;
            let messages = state.history.load(&thread_id).await?;
            *current_thread = Some(thread_id.clone());
            send_json(
                sender,
                &json!({ "type": "history", "threadId": thread_id, "messages": messages }),
            )
            .await
        }
        WsIncomingMessage::Chat { thread_id, message } => {
            let thread_id = thread_id
                .or_else(|| current_thread.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            *current_thread = Some(thread_id.clone());

            let mut events = state.agent.stream_turn(thread_id, message);
            while let Some(event) = events.recv().await {
                send_json(sender, &event).await?;
            }
            Ok(())
        }
    }
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), ApiError> {
    let text = serde_json::to_string(payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)
}

fn error_frame(thread_id: Option<&str>, message: &str) -> Value {
    json!({ "type": "error", "threadId": thread_id, "message": message })
}
