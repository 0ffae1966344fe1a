use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A loaded report: one markdown-like text body plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source: String,
    pub checksum: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Table,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Table => "table",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(ChunkKind::Text),
            "table" => Some(ChunkKind::Table),
            _ => None,
        }
    }
}

/// The unit of embedding and retrieval. Required fields are named; anything
/// else rides in the open `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: usize,
    pub kind: ChunkKind,
    pub content: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(source: &str, chunk_index: usize, kind: ChunkKind, content: String) -> Self {
        Self {
            id: chunk_id(source, chunk_index),
            source: source.to_string(),
            chunk_index,
            kind,
            content,
            extra: BTreeMap::new(),
        }
    }
}

/// Stable chunk identity: `<source>-chunk-<index>`, zero-based in document
/// order. Re-running ingestion on unchanged input regenerates the same IDs,
/// which is what makes upsert idempotent.
pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{source}-chunk-{index}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A generated answer and the chunk IDs it was grounded on, in reranked
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Candidates fetched by similarity search. Chosen to comfortably
    /// exceed `top_n`; the reranker does the precise narrowing.
    pub candidate_k: usize,
    /// Chunks kept after reranking and cited as sources.
    pub top_n: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            candidate_k: 25,
            top_n: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub total_chunks: usize,
    pub existing: usize,
    pub added: usize,
}
