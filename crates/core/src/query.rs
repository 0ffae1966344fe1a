use crate::error::ServiceError;
use crate::models::{Answer, Chunk, RetrievalOptions, ScoredChunk};
use crate::traits::{AnswerGenerator, ChunkIndex, Embedder, Reranker};
use tracing::debug;

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|scored| scored.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// The fixed prompt. The generator is instructed to answer only from the
/// supplied context, never from its own knowledge.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question based only on the following context:\n\n\
         {context}\n\n\
         ---\n\n\
         Answer the question based on the above context: {question}"
    )
}

/// Retrieve-rerank-generate, linear and sequential. Any stage failure
/// aborts the whole query; there is no partial-answer fallback and no
/// retry.
pub struct QueryPipeline<E, I, R, G> {
    embedder: E,
    index: I,
    reranker: R,
    generator: G,
    options: RetrievalOptions,
}

impl<E, I, R, G> QueryPipeline<E, I, R, G>
where
    E: Embedder + Send + Sync,
    I: ChunkIndex + Send + Sync,
    R: Reranker + Send + Sync,
    G: AnswerGenerator + Send + Sync,
{
    pub fn new(
        embedder: E,
        index: I,
        reranker: R,
        generator: G,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            generator,
            options,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, ServiceError> {
        if question.trim().is_empty() {
            return Err(ServiceError::Request("question is empty".to_string()));
        }

        let query_vector = self.embedder.embed(question).await?;
        let candidates = self
            .index
            .search(&query_vector, self.options.candidate_k)
            .await?;
        debug!(candidates = candidates.len(), "similarity search complete");

        let chunks: Vec<Chunk> = candidates.into_iter().map(|scored| scored.chunk).collect();
        let reranked = self
            .reranker
            .rerank(question, chunks, self.options.top_n)
            .await?;
        debug!(kept = reranked.len(), "reranked candidates");

        let context = build_context(&reranked);
        let prompt = build_prompt(&context, question);
        let text = self.generator.generate(&prompt).await?;

        let sources = reranked
            .iter()
            .map(|scored| scored.chunk.id.clone())
            .collect();

        Ok(Answer { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, QueryPipeline, CONTEXT_SEPARATOR};
    use crate::error::ServiceError;
    use crate::models::{Chunk, ChunkKind, RetrievalOptions, ScoredChunk};
    use crate::traits::{AnswerGenerator, ChunkIndex, Embedder, Reranker};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FakeIndex {
        hits: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl ChunkIndex for FakeIndex {
        async fn existing_ids(&self) -> Result<HashSet<String>, ServiceError> {
            Ok(self.hits.iter().map(|hit| hit.chunk.id.clone()).collect())
        }

        async fn upsert(&self, _chunks: &[Chunk]) -> Result<usize, ServiceError> {
            Ok(0)
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            k: usize,
        ) -> Result<Vec<ScoredChunk>, ServiceError> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }

        async fn reset(&self) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    /// Scores candidates by their position from the back, so reranking
    /// visibly reorders the similarity ranking.
    struct ReversingReranker;

    #[async_trait]
    impl Reranker for ReversingReranker {
        async fn rerank(
            &self,
            _query: &str,
            candidates: Vec<Chunk>,
            top_n: usize,
        ) -> Result<Vec<ScoredChunk>, ServiceError> {
            let total = candidates.len();
            let mut scored: Vec<ScoredChunk> = candidates
                .into_iter()
                .enumerate()
                .map(|(position, chunk)| ScoredChunk {
                    chunk,
                    score: position as f32 / total.max(1) as f32,
                })
                .collect();
            scored.sort_by(|left, right| right.score.total_cmp(&left.score));
            scored.truncate(top_n);
            Ok(scored)
        }
    }

    /// Echoes the prompt back, so tests can inspect exactly what the
    /// generator was given.
    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            Ok(prompt.to_string())
        }
    }

    fn hit(index: usize, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new("report.pdf", index, ChunkKind::Text, content.to_string()),
            score,
        }
    }

    fn pipeline(
        hits: Vec<ScoredChunk>,
        options: RetrievalOptions,
    ) -> QueryPipeline<FakeEmbedder, FakeIndex, ReversingReranker, EchoGenerator> {
        QueryPipeline::new(
            FakeEmbedder,
            FakeIndex { hits },
            ReversingReranker,
            EchoGenerator,
            options,
        )
    }

    #[tokio::test]
    async fn prompt_holds_exactly_the_reranked_context_and_question() {
        let hits = vec![
            hit(1, "Operating costs were flat.", 0.9),
            hit(2, "Headcount grew slightly.", 0.8),
            hit(3, "Total revenue was 46.2 billion for the year.", 0.7),
        ];
        let options = RetrievalOptions {
            candidate_k: 25,
            top_n: 2,
        };
        let question = "What was total revenue?";

        let answer = pipeline(hits, options).answer(question).await.unwrap();

        // the reversing reranker keeps the last two candidates, best first
        let expected_context = format!(
            "Total revenue was 46.2 billion for the year.{CONTEXT_SEPARATOR}Headcount grew slightly."
        );
        assert_eq!(answer.text, build_prompt(&expected_context, question));
        assert!(answer.text.contains(question));
        assert!(!answer.text.contains("Operating costs were flat."));
    }

    #[tokio::test]
    async fn sources_are_reranked_chunk_ids_in_order() {
        let hits = vec![
            hit(0, "Irrelevant preamble.", 0.9),
            hit(3, "Total revenue was 46.2 billion for the year.", 0.8),
        ];
        let options = RetrievalOptions {
            candidate_k: 25,
            top_n: 5,
        };

        let answer = pipeline(hits, options)
            .answer("What was total revenue?")
            .await
            .unwrap();

        assert_eq!(
            answer.sources,
            vec![
                "report.pdf-chunk-3".to_string(),
                "report.pdf-chunk-0".to_string(),
            ]
        );
        assert!(answer.sources.contains(&"report.pdf-chunk-3".to_string()));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let options = RetrievalOptions::default();
        let result = pipeline(Vec::new(), options).answer("   ").await;
        assert!(matches!(result, Err(ServiceError::Request(_))));
    }
}
