//! Durable per-thread conversation history.
//!
//! Threads are created implicitly by their first `append`. Messages are
//! append-only; each `append` is a single SQLite transaction, so readers never
//! observe half of a batch.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, Role, ToolCall};

const SCHEMA_VERSION: i64 = 1;
const MAX_THREAD_ID_LEN: usize = 256;
const PREVIEW_CHARS: usize = 80;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist `messages` at the end of the thread, creating it if needed.
    async fn append(&self, thread_id: &str, messages: &[ChatMessage]) -> Result<(), ApiError>;

    /// Full ordered history; empty for an unknown thread.
    async fn load(&self, thread_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    /// Every persisted thread id, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<String>, ApiError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub preview: String,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { db_path, pool };
        store.init_db().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        match version {
            0 => self.create_schema().await,
            SCHEMA_VERSION => Ok(()),
            other => Err(ApiError::Internal(format!(
                "conversation database {} has unsupported schema version {}",
                self.db_path.display(),
                other
            ))),
        }
    }

    async fn create_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system', 'tool')),
                content TEXT NOT NULL,
                tool_calls TEXT,
                tool_call_id TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_updated_at ON threads(updated_at DESC)")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_id_id ON messages(thread_id, id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Thread list for the sidebar: counts plus the opening user message.
    pub async fn list_thread_summaries(&self) -> Result<Vec<ThreadSummary>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT t.id, t.created_at, t.updated_at,
                   (SELECT COUNT(*) FROM messages WHERE thread_id = t.id) AS message_count,
                   (SELECT content FROM messages
                     WHERE thread_id = t.id AND role = 'user'
                     ORDER BY id ASC LIMIT 1) AS first_user_message
            FROM threads t
            ORDER BY t.updated_at DESC, t.id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter()
            .map(|row| {
                let first: Option<String> = row.try_get("first_user_message")?;
                Ok(ThreadSummary {
                    id: row.try_get("id")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                    message_count: row.try_get("message_count")?,
                    preview: first.map(|text| preview(&text)).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }

    async fn check_tool_linkage(
        tx: &mut Transaction<'_, Sqlite>,
        thread_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), ApiError> {
        let rows = sqlx::query(
            "SELECT role, tool_calls, tool_call_id FROM messages
             WHERE thread_id = ?1 AND (role = 'tool' OR (role = 'assistant' AND tool_calls IS NOT NULL))",
        )
        .bind(thread_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(ApiError::internal)?;

        let mut requested = HashSet::new();
        let mut answered = HashSet::new();
        for row in &rows {
            let role: String = row.try_get("role").map_err(ApiError::internal)?;
            if role == "tool" {
                if let Some(id) = row
                    .try_get::<Option<String>, _>("tool_call_id")
                    .map_err(ApiError::internal)?
                {
                    answered.insert(id);
                }
            } else {
                let raw: Option<String> = row.try_get("tool_calls").map_err(ApiError::internal)?;
                for call in decode_tool_calls(raw.as_deref())? {
                    requested.insert(call.id);
                }
            }
        }

        for message in messages {
            match message.role {
                Role::Assistant => {
                    requested.extend(message.tool_calls.iter().map(|call| call.id.clone()));
                }
                Role::Tool => {
                    let call_id = message.tool_call_id.as_deref().ok_or_else(|| {
                        ApiError::BadRequest("tool message without a call id".to_string())
                    })?;
                    if !requested.contains(call_id) {
                        return Err(ApiError::BadRequest(format!(
                            "tool result `{}` has no matching tool call in thread {}",
                            call_id, thread_id
                        )));
                    }
                    if !answered.insert(call_id.to_string()) {
                        return Err(ApiError::BadRequest(format!(
                            "tool call `{}` in thread {} is already answered",
                            call_id, thread_id
                        )));
                    }
                }
                Role::User | Role::System => {}
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for HistoryStore {
    async fn append(&self, thread_id: &str, messages: &[ChatMessage]) -> Result<(), ApiError> {
        validate_thread_id(thread_id)?;
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO threads (id) VALUES (?1)")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query(
            "UPDATE threads SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        )
        .bind(thread_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        if messages.iter().any(|m| m.role == Role::Tool) {
            Self::check_tool_linkage(&mut tx, thread_id, messages).await?;
        }

        for message in messages {
            let tool_calls = if message.tool_calls.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.tool_calls).map_err(ApiError::internal)?)
            };

            sqlx::query(
                "INSERT INTO messages (thread_id, role, content, tool_calls, tool_call_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(thread_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(tool_calls)
            .bind(&message.tool_call_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT role, content, tool_calls, tool_call_id FROM messages
             WHERE thread_id = ?1 ORDER BY id ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn list_threads(&self) -> Result<Vec<String>, ApiError> {
        sqlx::query_scalar("SELECT id FROM threads ORDER BY updated_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

pub fn validate_thread_id(thread_id: &str) -> Result<(), ApiError> {
    if thread_id.trim().is_empty() {
        return Err(ApiError::BadRequest("thread id cannot be empty".to_string()));
    }
    if thread_id.len() > MAX_THREAD_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "thread id exceeds {} bytes",
            MAX_THREAD_ID_LEN
        )));
    }
    Ok(())
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, ApiError> {
    let role: String = row.try_get("role").map_err(ApiError::internal)?;
    let role = Role::parse(&role)
        .ok_or_else(|| ApiError::Internal(format!("unknown role in history: {}", role)))?;
    let raw_calls: Option<String> = row.try_get("tool_calls").map_err(ApiError::internal)?;

    Ok(ChatMessage {
        role,
        content: row.try_get("content").map_err(ApiError::internal)?,
        tool_calls: decode_tool_calls(raw_calls.as_deref())?,
        tool_call_id: row.try_get("tool_call_id").map_err(ApiError::internal)?,
    })
}

fn decode_tool_calls(raw: Option<&str>) -> Result<Vec<ToolCall>, ApiError> {
    match raw {
        Some(text) if !text.is_empty() => serde_json::from_str(text).map_err(ApiError::internal),
        _ => Ok(Vec::new()),
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= PREVIEW_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> HistoryStore {
        let tmp = std::env::temp_dir().join(format!(
            "multirag-history-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        HistoryStore::new(tmp).await.unwrap()
    }

    fn search_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "search_tool".to_string(),
            arguments: json!({ "query": "rust" }),
        }
    }

    #[tokio::test]
    async fn load_returns_exactly_what_was_appended() {
        let store = test_store().await;
        let messages = vec![
            ChatMessage::user("what is rust?"),
            ChatMessage::assistant_with_tools("", vec![search_call("call_1")]),
            ChatMessage::tool("call_1", "Rust is a systems language."),
            ChatMessage::assistant("Rust is a **systems** language."),
        ];

        store.append("t1", &messages[..1]).await.unwrap();
        store.append("t1", &messages[1..]).await.unwrap();

        assert_eq!(store.load("t1").await.unwrap(), messages);
    }

    #[tokio::test]
    async fn unknown_thread_loads_empty() {
        let store = test_store().await;
        assert!(store.load("missing").await.unwrap().is_empty());
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_threads_is_deduplicated() {
        let store = test_store().await;
        store.append("a", &[ChatMessage::user("one")]).await.unwrap();
        store.append("b", &[ChatMessage::user("two")]).await.unwrap();
        store.append("a", &[ChatMessage::assistant("three")]).await.unwrap();

        let mut threads = store.list_threads().await.unwrap();
        threads.sort();
        assert_eq!(threads, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn orphan_tool_results_are_rejected_atomically() {
        let store = test_store().await;
        store.append("t", &[ChatMessage::user("hi")]).await.unwrap();

        let err = store
            .append(
                "t",
                &[
                    ChatMessage::assistant("partial"),
                    ChatMessage::tool("call_missing", "result"),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(store.load("t").await.unwrap(), vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn tool_call_cannot_be_answered_twice() {
        let store = test_store().await;
        store
            .append(
                "t",
                &[
                    ChatMessage::assistant_with_tools("", vec![search_call("call_1")]),
                    ChatMessage::tool("call_1", "first"),
                ],
            )
            .await
            .unwrap();

        let err = store
            .append("t", &[ChatMessage::tool("call_1", "second")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already answered"));
    }

    #[tokio::test]
    async fn summaries_use_first_user_message() {
        let store = test_store().await;
        store
            .append(
                "t",
                &[ChatMessage::user("explain ownership\nin detail"), ChatMessage::assistant("ok")],
            )
            .await
            .unwrap();

        let summaries = store.list_thread_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summaries[0].preview, "explain ownership");
    }

    #[tokio::test]
    async fn history_survives_reopening_the_database() {
        let path = std::env::temp_dir().join(format!(
            "multirag-history-reopen-{}.db",
            uuid::Uuid::new_v4()
        ));
        {
            let store = HistoryStore::new(path.clone()).await.unwrap();
            store.append("t", &[ChatMessage::user("persist me")]).await.unwrap();
        }

        let reopened = HistoryStore::new(path).await.unwrap();
        assert_eq!(reopened.load("t").await.unwrap(), vec![ChatMessage::user("persist me")]);
    }

    #[test]
    fn empty_thread_ids_are_rejected() {
        assert!(validate_thread_id("  ").is_err());
        assert!(validate_thread_id(&"x".repeat(300)).is_err());
        assert!(validate_thread_id("3f1c6a52").is_ok());
    }
}
