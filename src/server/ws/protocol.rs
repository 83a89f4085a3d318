use serde::Deserialize;

/// Frames a client may send over `/ws`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncomingMessage {
    /// Run a turn. Without `threadId` the connection's current thread is used,
    /// or a new one is allocated.
    Chat {
        #[serde(rename = "threadId", default)]
        thread_id: Option<String>,
        message: String,
    },
    /// Switch the connection to another thread and receive its history.
    SetThread {
        #[serde(rename = "threadId")]
        thread_id: String,
    },
}
