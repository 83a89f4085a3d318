//! SQLite-backed document index.
//!
//! Chunk text and metadata live in `rag_chunks`, embeddings as little-endian
//! `f32` blobs. Search is brute-force cosine similarity over every row.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkMatch, DocumentChunk, IndexMeta, RagStore};
use super::vector_math::rank_descending_by_cosine;
use crate::core::errors::ApiError;

const META_EMBEDDER: &str = "embedding_model";
const META_BUILT_AT: &str = "built_at";

pub struct SqliteRagStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRagStore {
    /// Opens (creating if missing) the index at `db_path`.
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    /// `None` when no index file exists at `db_path`.
    pub async fn open_existing(db_path: PathBuf) -> Result<Option<Self>, ApiError> {
        if !db_path.is_file() {
            return Ok(None);
        }
        Self::with_path(db_path).await.map(Some)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                chunk_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentChunk, sqlx::Error> {
        let chunk_index: i64 = row.try_get("chunk_index")?;
        let start_offset: i64 = row.try_get("start_offset")?;
        Ok(DocumentChunk {
            chunk_id: row.try_get("chunk_id")?,
            source: row.try_get("source")?,
            chunk_index: chunk_index as usize,
            start_offset: start_offset as usize,
            text: row.try_get("content")?,
        })
    }

    async fn meta_value(&self, key: &str) -> Result<Option<String>, ApiError> {
        sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

#[async_trait]
impl RagStore for SqliteRagStore {
    async fn write_index(
        &self,
        items: Vec<(DocumentChunk, Vec<f32>)>,
        embedder_id: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM rag_chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM rag_meta")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO rag_chunks (chunk_id, source, chunk_index, start_offset, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(&chunk.text)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        let built_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        for (key, value) in [(META_EMBEDDER, embedder_id), (META_BUILT_AT, built_at.as_str())] {
            sqlx::query("INSERT OR REPLACE INTO rag_meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, source, chunk_index, start_offset, content, embedding
             FROM rag_chunks
             ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut embeddings = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.try_get("embedding").map_err(ApiError::internal)?;
            chunks.push(Self::row_to_chunk(row).map_err(ApiError::internal)?);
            embeddings.push(Self::deserialize_embedding(&bytes));
        }

        let ranked = rank_descending_by_cosine(query_embedding, &embeddings)?;

        Ok(ranked
            .into_iter()
            .take(limit)
            .filter_map(|(idx, score)| {
                chunks.get(idx).cloned().map(|chunk| ChunkMatch { chunk, score })
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }

    async fn meta(&self) -> Result<IndexMeta, ApiError> {
        Ok(IndexMeta {
            embedder_id: self.meta_value(META_EMBEDDER).await?,
            built_at: self.meta_value(META_BUILT_AT).await?,
            chunk_count: self.count().await?,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteRagStore {
        let tmp = std::env::temp_dir().join(format!("multirag-index-test-{}.db", uuid::Uuid::new_v4()));
        SqliteRagStore::with_path(tmp).await.unwrap()
    }

    fn chunk(id: &str, index: usize, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            source: "notes.md".to_string(),
            chunk_index: index,
            start_offset: index * 10,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn write_and_search() {
        let store = test_store().await;
        store
            .write_index(
                vec![
                    (chunk("c1", 0, "hello world"), vec![1.0, 0.0, 0.0]),
                    (chunk("c2", 1, "goodbye world"), vec![0.0, 1.0, 0.0]),
                ],
                "hashing-sha256-3",
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk, chunk("c1", 0, "hello world"));
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn fresh_store_is_incomplete() {
        let store = test_store().await;
        let meta = store.meta().await.unwrap();
        assert_eq!(meta, IndexMeta::default());
        assert!(!meta.is_complete_for("hashing-sha256-3"));
    }

    #[tokio::test]
    async fn rewriting_replaces_previous_contents() {
        let store = test_store().await;
        store
            .write_index(vec![(chunk("old", 0, "stale"), vec![1.0, 0.0])], "a")
            .await
            .unwrap();
        store
            .write_index(vec![(chunk("new", 0, "fresh"), vec![0.0, 1.0])], "b")
            .await
            .unwrap();

        let meta = store.meta().await.unwrap();
        assert_eq!(meta.chunk_count, 1);
        assert!(meta.is_complete_for("b"));
        assert!(!meta.is_complete_for("a"));
    }

    #[tokio::test]
    async fn open_existing_requires_a_file() {
        let tmp = std::env::temp_dir().join(format!("multirag-missing-{}.db", uuid::Uuid::new_v4()));
        assert!(SqliteRagStore::open_existing(tmp).await.unwrap().is_none());
    }
}
