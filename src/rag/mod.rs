//! Document ingestion and retrieval.
//!
//! - `loader` / `splitter` / `pipeline`: read the document folder, chunk it and
//!   persist an embedded index
//! - `sqlite`: the persisted index (`RagStore` implementation)
//! - `knowledge`: lazy index lifecycle, uploads and invalidation

pub mod embedding;
pub mod index;
pub mod knowledge;
pub mod loader;
pub mod pipeline;
pub mod splitter;
pub mod sqlite;
pub mod store;
pub mod vector_math;

pub use embedding::{build_embedder, Embedder, HashingEmbedder, RemoteEmbedder};
pub use index::{DocumentIndex, IndexStatus, Retriever};
pub use knowledge::{IndexReport, KnowledgeBase, UploadReport};
pub use loader::{FetchFailure, FetchReport, SourceDocument};
pub use pipeline::IngestionPipeline;
pub use splitter::TextSplitter;
pub use sqlite::SqliteRagStore;
pub use store::{ChunkMatch, DocumentChunk, IndexMeta, RagStore};
