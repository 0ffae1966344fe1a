pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod query;
pub mod rerank;
pub mod stores;
pub mod traits;

pub use chunking::split_document;
pub use embeddings::HttpEmbedder;
pub use error::{IngestError, Result, ServiceError};
pub use generate::OllamaGenerator;
pub use ingest::{ingest_document, ingest_report};
pub use loader::{digest_file, load_report, pdf_to_markdown};
pub use models::{
    chunk_id, Answer, Chunk, ChunkKind, ChunkingOptions, Document, IngestionReport,
    RetrievalOptions, ScoredChunk,
};
pub use query::{build_context, build_prompt, QueryPipeline, CONTEXT_SEPARATOR};
pub use rerank::HttpReranker;
pub use stores::SqliteChunkIndex;
pub use traits::{AnswerGenerator, ChunkIndex, Embedder, Reranker};
