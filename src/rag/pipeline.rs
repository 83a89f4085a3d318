//! Fetch, chunk, embed and persist the document folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use super::embedding::Embedder;
use super::index::{DocumentIndex, IndexStatus};
use super::loader::{self, FetchReport, SourceDocument};
use super::splitter::TextSplitter;
use super::sqlite::SqliteRagStore;
use super::store::{DocumentChunk, RagStore};
use crate::core::config::IngestionSettings;
use crate::core::errors::ApiError;

const EMBED_BATCH_SIZE: usize = 64;

pub struct IngestionPipeline {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    index_path: PathBuf,
}

impl IngestionPipeline {
    pub fn new(
        settings: IngestionSettings,
        embedder: Arc<dyn Embedder>,
        index_path: PathBuf,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            splitter: TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?,
            embedder,
            index_path,
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub async fn fetch(&self, folder: &Path) -> Result<FetchReport, ApiError> {
        let folder = folder.to_path_buf();
        tokio::task::spawn_blocking(move || loader::fetch(&folder))
            .await
            .map_err(ApiError::internal)?
    }

    pub fn chunk(&self, documents: &[SourceDocument]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.splitter
                    .split_with_offsets(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, (start_offset, text))| DocumentChunk {
                        chunk_id: chunk_id(&doc.source, chunk_index, &text),
                        source: doc.source.clone(),
                        chunk_index,
                        start_offset,
                        text,
                    })
            })
            .collect()
    }

    /// Loads the persisted index when it is complete and was built by the
    /// current embedder, otherwise rebuilds it from `folder`.
    pub async fn build_index(&self, folder: &Path) -> Result<(DocumentIndex, IndexStatus), ApiError> {
        let embedder_id = self.embedder.id();

        if let Some(store) = SqliteRagStore::open_existing(self.index_path.clone()).await? {
            let meta = store.meta().await?;
            if meta.is_complete_for(&embedder_id) {
                info!(
                    "Loaded document index {} ({} chunks)",
                    self.index_path.display(),
                    meta.chunk_count
                );
                return Ok((
                    DocumentIndex::new(Arc::new(store), self.embedder.clone()),
                    IndexStatus::Loaded,
                ));
            }

            warn!(
                "Discarding document index {} (embedder {:?}, built_at {:?})",
                self.index_path.display(),
                meta.embedder_id,
                meta.built_at
            );
            store.close().await;
            remove_index_files(&self.index_path).await?;
        }

        let report = self.fetch(folder).await?;
        let chunks = self.chunk(&report.documents);
        info!(
            "Indexing {} chunks from {} documents in {} ({} skipped)",
            chunks.len(),
            report.documents.len(),
            folder.display(),
            report.failures.len()
        );

        let mut items = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(ApiError::Internal(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }
            items.extend(batch.iter().cloned().zip(embeddings));
            debug!("Embedded {}/{} chunks", items.len(), chunks.len());
        }

        let store = SqliteRagStore::with_path(self.index_path.clone()).await?;
        store.write_index(items, &embedder_id).await?;

        Ok((
            DocumentIndex::new(Arc::new(store), self.embedder.clone()),
            IndexStatus::Built,
        ))
    }
}

/// Deletes the index database and its WAL side files, if present.
pub async fn remove_index_files(index_path: &Path) -> Result<(), ApiError> {
    let mut targets = vec![index_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = index_path.as_os_str().to_os_string();
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }

    for target in targets {
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ApiError::internal(err)),
        }
    }
    Ok(())
}

fn chunk_id(source: &str, chunk_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedding::HashingEmbedder;

    fn pipeline(index_path: PathBuf) -> IngestionPipeline {
        IngestionPipeline::new(
            IngestionSettings {
                chunk_size: 50,
                chunk_overlap: 0,
            },
            Arc::new(HashingEmbedder::new(64).unwrap()),
            index_path,
        )
        .unwrap()
    }

    #[test]
    fn chunks_carry_source_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path().join("index.db"));
        let docs = vec![SourceDocument {
            source: "guide.md".to_string(),
            path: dir.path().join("guide.md"),
            text: "First paragraph.\n\nSecond paragraph is here.".to_string(),
        }];

        let chunks = pipeline.chunk(&docs);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "guide.md");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_id.len(), 64);
    }

    #[tokio::test]
    async fn missing_folder_fails_with_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path().join("index.db"));

        let err = pipeline
            .build_index(&dir.path().join("docs"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::SourceNotFound(_)));
        assert!(!dir.path().join("index.db").exists());
    }

    #[tokio::test]
    async fn remove_index_files_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::write(&path, b"x").unwrap();
        std::fs::write(dir.path().join("index.db-wal"), b"x").unwrap();

        remove_index_files(&path).await.unwrap();

        assert!(!path.exists());
        assert!(!dir.path().join("index.db-wal").exists());
    }
}
