//! The document folder and its lazily built index, shared by the tools and
//! the HTTP surface.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::index::{DocumentIndex, IndexStatus, Retriever};
use super::loader;
use super::pipeline::{remove_index_files, IngestionPipeline};
use super::store::IndexMeta;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub exists: bool,
    pub loaded: bool,
    pub embedder_id: String,
    #[serde(flatten)]
    pub meta: IndexMeta,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct UploadReport {
    pub saved: Vec<String>,
    /// Names already present in the folder; existing files are never overwritten.
    pub skipped: Vec<String>,
}

pub struct KnowledgeBase {
    docs_dir: PathBuf,
    pipeline: IngestionPipeline,
    index: RwLock<Option<Arc<DocumentIndex>>>,
    build_lock: Mutex<()>,
}

impl KnowledgeBase {
    pub fn new(docs_dir: PathBuf, pipeline: IngestionPipeline) -> Self {
        Self {
            docs_dir,
            pipeline,
            index: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    /// The loaded index, building or loading it on first use.
    pub async fn ensure_index(&self) -> Result<(Arc<DocumentIndex>, Option<IndexStatus>), ApiError> {
        if let Some(index) = self.index.read().await.clone() {
            return Ok((index, None));
        }

        let _guard = self.build_lock.lock().await;
        if let Some(index) = self.index.read().await.clone() {
            return Ok((index, None));
        }

        let (index, status) = self.pipeline.build_index(&self.docs_dir).await?;
        let index = Arc::new(index);
        *self.index.write().await = Some(index.clone());
        info!("Document index ready ({:?})", status);
        Ok((index, Some(status)))
    }

    /// Drops the loaded index and deletes its files; the next retrieval rebuilds.
    pub async fn invalidate(&self) -> Result<(), ApiError> {
        let _guard = self.build_lock.lock().await;
        if let Some(index) = self.index.write().await.take() {
            index.close().await;
        }
        remove_index_files(self.pipeline.index_path()).await?;
        info!("Document index invalidated");
        Ok(())
    }

    pub async fn rebuild(&self) -> Result<IndexStatus, ApiError> {
        self.invalidate().await?;
        let (_, status) = self.ensure_index().await?;
        Ok(status.unwrap_or(IndexStatus::Built))
    }

    pub async fn status(&self) -> Result<IndexReport, ApiError> {
        let loaded = self.index.read().await.clone();
        let meta = match &loaded {
            Some(index) => index.meta().await?,
            None => IndexMeta::default(),
        };

        Ok(IndexReport {
            exists: self.pipeline.index_path().is_file(),
            loaded: loaded.is_some(),
            embedder_id: self.pipeline.embedder().id(),
            meta,
        })
    }

    pub async fn list_documents(&self) -> Result<Vec<String>, ApiError> {
        let docs_dir = self.docs_dir.clone();
        tokio::task::spawn_blocking(move || loader::list_documents(&docs_dir))
            .await
            .map_err(ApiError::internal)?
    }

    /// Writes uploads into the document folder and invalidates the index when
    /// anything new was saved.
    ///
    /// The batch stops at the first failing file. Files saved before it stay
    /// on disk and still invalidate the index.
    pub async fn save_uploads(&self, files: Vec<(String, Vec<u8>)>) -> Result<UploadReport, ApiError> {
        fs::create_dir_all(&self.docs_dir)
            .await
            .map_err(ApiError::internal)?;

        let mut report = UploadReport::default();
        let mut failure = None;
        for (name, bytes) in files {
            match self.save_upload(&name, &bytes).await {
                Ok(Saved::Created(name)) => report.saved.push(name),
                Ok(Saved::Exists(name)) => report.skipped.push(name),
                Err(err) => {
                    warn!("Upload {:?} failed: {}", name, err);
                    failure = Some(err);
                    break;
                }
            }
        }

        if !report.saved.is_empty() {
            self.invalidate().await?;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    async fn save_upload(&self, name: &str, bytes: &[u8]) -> Result<Saved, ApiError> {
        let name = sanitize_file_name(name)?;
        let target = self.docs_dir.join(&name);

        // create_new makes the existence check and the create one step.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(Saved::Exists(name)),
            Err(err) => {
                return Err(ApiError::BadRequest(format!(
                    "cannot save {:?}: {}",
                    name, err
                )))
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(err) = written {
            drop(file);
            let _ = fs::remove_file(&target).await;
            return Err(ApiError::internal(err));
        }
        Ok(Saved::Created(name))
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, ApiError> {
        let (index, _) = match self.ensure_index().await {
            Ok(found) => found,
            Err(ApiError::SourceNotFound(_)) => return Err(ApiError::IndexUnavailable),
            Err(err) => return Err(err),
        };
        index.retrieve(query, k).await
    }
}

enum Saved {
    Created(String),
    Exists(String),
}

/// Keeps only the final path component of an uploaded file name.
fn sanitize_file_name(name: &str) -> Result<String, ApiError> {
    let normalized = name.replace('\\', "/");
    let candidate = Path::new(&normalized)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .last()
        .unwrap_or_default();

    if candidate.trim().is_empty() || candidate.starts_with('.') {
        return Err(ApiError::BadRequest(format!("invalid file name: {:?}", name)));
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IngestionSettings;
    use crate::rag::embedding::HashingEmbedder;

    fn knowledge(root: &Path) -> KnowledgeBase {
        let pipeline = IngestionPipeline::new(
            IngestionSettings {
                chunk_size: 200,
                chunk_overlap: 0,
            },
            Arc::new(HashingEmbedder::new(128).unwrap()),
            root.join("index.db"),
        )
        .unwrap();
        KnowledgeBase::new(root.join("docs"), pipeline)
    }

    #[test]
    fn upload_names_are_reduced_to_file_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\notes.md").unwrap(), "notes.md");
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name(".env").is_err());
    }

    #[tokio::test]
    async fn retrieval_without_a_folder_is_index_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge(dir.path());
        assert!(matches!(
            kb.retrieve("anything", 3).await,
            Err(ApiError::IndexUnavailable)
        ));
    }

    #[tokio::test]
    async fn uploads_skip_existing_names_and_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge(dir.path());

        let first = kb
            .save_uploads(vec![("a.md".to_string(), b"tokio runtime".to_vec())])
            .await
            .unwrap();
        assert_eq!(first.saved, vec!["a.md".to_string()]);

        kb.ensure_index().await.unwrap();
        assert!(kb.status().await.unwrap().loaded);

        let second = kb
            .save_uploads(vec![
                ("a.md".to_string(), b"overwritten?".to_vec()),
                ("b.md".to_string(), b"axum router".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(second.skipped, vec!["a.md".to_string()]);
        assert_eq!(second.saved, vec!["b.md".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/a.md")).unwrap(),
            "tokio runtime"
        );

        let status = kb.status().await.unwrap();
        assert!(!status.loaded);
        assert!(!status.exists);

        assert_eq!(kb.rebuild().await.unwrap(), IndexStatus::Built);
        assert_eq!(kb.status().await.unwrap().meta.chunk_count, 2);
    }

    #[tokio::test]
    async fn failed_batch_still_invalidates_for_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge(dir.path());
        kb.save_uploads(vec![("a.md".to_string(), b"tokio runtime".to_vec())])
            .await
            .unwrap();
        kb.ensure_index().await.unwrap();

        let result = kb
            .save_uploads(vec![
                ("alps.txt".to_string(), b"glacier crevasse moraine".to_vec()),
                (".env".to_string(), b"SECRET=1".to_vec()),
                ("late.md".to_string(), b"never written".to_vec()),
            ])
            .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(dir.path().join("docs/alps.txt").is_file());
        assert!(!dir.path().join("docs/late.md").exists());
        assert!(!kb.status().await.unwrap().loaded);

        let found = kb.retrieve("glacier crevasse", 1).await.unwrap();
        assert_eq!(found, vec!["glacier crevasse moraine".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_uploads_of_one_name_save_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Arc::new(knowledge(dir.path()));

        let uploads = (0..4).map(|i| {
            let kb = kb.clone();
            async move {
                kb.save_uploads(vec![("same.md".to_string(), format!("copy {}", i).into_bytes())])
                    .await
                    .unwrap()
            }
        });
        let reports = futures_util::future::join_all(uploads).await;

        let saved: usize = reports.iter().map(|r| r.saved.len()).sum();
        let skipped: usize = reports.iter().map(|r| r.skipped.len()).sum();
        assert_eq!(saved, 1);
        assert_eq!(skipped, 3);
    }
}
