use crate::error::ServiceError;
use crate::models::{Chunk, ScoredChunk};
use async_trait::async_trait;
use std::collections::HashSet;

/// Opaque embedding service: text in, fixed-length vector out. All vectors
/// from one instance live in the same space.
#[async_trait]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Persistent chunk index keyed by stable chunk ID.
#[async_trait]
pub trait ChunkIndex {
    async fn existing_ids(&self) -> Result<HashSet<String>, ServiceError>;

    /// Embeds and persists chunks whose ID is not yet present; chunks with
    /// a known ID are silently skipped, not re-embedded or compared.
    /// Returns how many were newly added.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, ServiceError>;

    /// Top-k records by vector similarity, highest first.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError>;

    /// Deletes all persisted state unconditionally. Irreversible.
    async fn reset(&self) -> Result<(), ServiceError>;
}

/// Opaque cross-encoder: scores (query, document) pairs jointly and keeps
/// the best `top_n`.
#[async_trait]
pub trait Reranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Chunk>,
        top_n: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError>;
}

/// Opaque generative model: prompt in, completion out.
#[async_trait]
pub trait AnswerGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
