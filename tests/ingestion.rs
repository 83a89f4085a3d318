use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use multirag::core::config::IngestionSettings;
use multirag::core::errors::ApiError;
use multirag::rag::{
    Embedder, HashingEmbedder, IndexStatus, IngestionPipeline, KnowledgeBase, RagStore, Retriever,
    SqliteRagStore,
};
use multirag::tools::{RetrieveFromDocsTool, Tool};

const SETTINGS: IngestionSettings = IngestionSettings {
    chunk_size: 200,
    chunk_overlap: 0,
};

/// Counts how many texts went through the wrapped embedder.
struct CountingEmbedder {
    inner: HashingEmbedder,
    embedded: AtomicUsize,
}

impl CountingEmbedder {
    fn new(dimensions: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimensions).unwrap(),
            embedded: AtomicUsize::new(0),
        }
    }

    fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn id(&self) -> String {
        self.inner.id()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// Cycles through `words` until the text is exactly `chars` long.
fn paragraph(words: &[&str], chars: usize) -> String {
    let mut text = String::new();
    for word in words.iter().cycle() {
        if text.len() + word.len() + 1 > chars {
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
    }
    while text.len() < chars {
        text.push('.');
    }
    text
}

fn write_sample_docs(folder: &Path) {
    std::fs::create_dir_all(folder).unwrap();
    let text = format!(
        "{}\n\n{}\n\n{}",
        paragraph(&["river", "bridge", "harbor", "ferry"], 198),
        paragraph(&["quokka", "narwhal", "axolotl", "pangolin"], 198),
        paragraph(&["ledger", "invoice", "audit"], 100)
    );
    assert_eq!(text.chars().count(), 500);
    std::fs::write(folder.join("notes.md"), text).unwrap();
}

#[tokio::test]
async fn indexed_document_is_searchable_by_its_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    write_sample_docs(&docs);

    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(512).unwrap()),
        dir.path().join("index.db"),
    )
    .unwrap();

    let (index, status) = pipeline.build_index(&docs).await.unwrap();
    assert_eq!(status, IndexStatus::Built);
    assert_eq!(index.meta().await.unwrap().chunk_count, 3);

    let found = index.search("quokka narwhal pangolin", 1).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].chunk.source, "notes.md");
    assert_eq!(found[0].chunk.chunk_index, 1);
    assert!(found[0].chunk.text.starts_with("quokka"));

    let passages = index.retrieve("ledger audit", 3).await.unwrap();
    assert_eq!(passages.len(), 3);
    assert!(passages[0].starts_with("ledger"));

    // Punctuation only: nothing to match against.
    assert!(index.search("?! ... --", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn second_build_reuses_the_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    let index_path = dir.path().join("index.db");
    write_sample_docs(&docs);

    let first_embedder = Arc::new(CountingEmbedder::new(512));
    let first = IngestionPipeline::new(SETTINGS, first_embedder.clone(), index_path.clone()).unwrap();
    let (index, status) = first.build_index(&docs).await.unwrap();
    assert_eq!(status, IndexStatus::Built);
    assert_eq!(first_embedder.embedded(), 3);
    let built_meta = index.meta().await.unwrap();
    index.close().await;

    // A fresh pipeline stands in for a process restart.
    let second_embedder = Arc::new(CountingEmbedder::new(512));
    let second = IngestionPipeline::new(SETTINGS, second_embedder.clone(), index_path).unwrap();
    let (reloaded, status) = second.build_index(&docs).await.unwrap();

    assert_eq!(status, IndexStatus::Loaded);
    assert_eq!(second_embedder.embedded(), 0);
    assert_eq!(reloaded.meta().await.unwrap(), built_meta);
}

#[tokio::test]
async fn changing_the_embedder_forces_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    let index_path = dir.path().join("index.db");
    write_sample_docs(&docs);

    let small = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(64).unwrap()),
        index_path.clone(),
    )
    .unwrap();
    let (index, _) = small.build_index(&docs).await.unwrap();
    index.close().await;

    let large = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(512).unwrap()),
        index_path,
    )
    .unwrap();
    let (index, status) = large.build_index(&docs).await.unwrap();

    assert_eq!(status, IndexStatus::Built);
    let meta = index.meta().await.unwrap();
    assert_eq!(meta.embedder_id.as_deref(), Some("hashing-sha256-512"));
    assert_eq!(meta.chunk_count, 3);
}

#[tokio::test]
async fn unfinished_index_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    let index_path = dir.path().join("index.db");
    write_sample_docs(&docs);

    // Schema only, never written: no built_at marker.
    let empty = SqliteRagStore::with_path(index_path.clone()).await.unwrap();
    empty.close().await;

    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(128).unwrap()),
        index_path,
    )
    .unwrap();
    let (index, status) = pipeline.build_index(&docs).await.unwrap();

    assert_eq!(status, IndexStatus::Built);
    assert_eq!(index.meta().await.unwrap().chunk_count, 3);
}

#[tokio::test]
async fn missing_folder_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(64).unwrap()),
        dir.path().join("index.db"),
    )
    .unwrap();

    let err = pipeline
        .build_index(&dir.path().join("nowhere"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ApiError::SourceNotFound(_)));
    assert!(!dir.path().join("index.db").exists());
}

#[tokio::test]
async fn knowledge_base_picks_up_uploads_after_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    write_sample_docs(&docs);

    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(512).unwrap()),
        dir.path().join("index.db"),
    )
    .unwrap();
    let knowledge = Arc::new(KnowledgeBase::new(docs.clone(), pipeline));

    let before = knowledge.retrieve("glacier crevasse", 1).await.unwrap();
    assert!(!before[0].contains("glacier"));

    let report = knowledge
        .save_uploads(vec![(
            "uploads/alps.txt".to_string(),
            b"glacier crevasse moraine serac".to_vec(),
        )])
        .await
        .unwrap();
    assert_eq!(report.saved, vec!["alps.txt".to_string()]);

    let after = knowledge.retrieve("glacier crevasse", 1).await.unwrap();
    assert_eq!(after, vec!["glacier crevasse moraine serac".to_string()]);
    assert_eq!(knowledge.status().await.unwrap().meta.chunk_count, 4);
}

#[tokio::test]
async fn retrieve_tool_answers_from_the_document_folder() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    write_sample_docs(&docs);

    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(512).unwrap()),
        dir.path().join("index.db"),
    )
    .unwrap();
    let knowledge = Arc::new(KnowledgeBase::new(docs, pipeline));
    let tool = RetrieveFromDocsTool::new(knowledge, 1);

    let output = tool
        .invoke(&json!({ "query": ["axolotl", "invoice"] }))
        .await
        .unwrap();
    let passages: Vec<String> = serde_json::from_str(&output).unwrap();

    assert_eq!(passages.len(), 2);
    assert!(passages[0].starts_with("quokka"));
    assert!(passages[1].starts_with("ledger"));
}

#[tokio::test]
async fn retrieve_tool_without_documents_returns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = IngestionPipeline::new(
        SETTINGS,
        Arc::new(HashingEmbedder::new(64).unwrap()),
        dir.path().join("index.db"),
    )
    .unwrap();
    let knowledge = Arc::new(KnowledgeBase::new(dir.path().join("docs"), pipeline));
    let tool = RetrieveFromDocsTool::new(knowledge, 3);

    let output = tool.invoke(&json!({ "query": "anything" })).await.unwrap();

    assert_eq!(output, "[]");
}
