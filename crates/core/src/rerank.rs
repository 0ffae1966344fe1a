use crate::error::ServiceError;
use crate::models::{Chunk, ScoredChunk};
use crate::traits::Reranker;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// Client for a cross-encoder scoring service: one `POST /rerank` call
/// scores every (query, candidate) pair jointly. Applied only after the
/// index has narrowed the field, since per-pair scoring is the expensive
/// precise stage.
#[derive(Clone)]
pub struct HttpReranker {
    client: Client,
    endpoint: String,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let base = base_url.into();
        Url::parse(&base)?;
        Ok(Self {
            client: Client::new(),
            endpoint: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Chunk>,
        top_n: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = candidates
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect();

        let response = self
            .client
            .post(format!("{}/rerank", self.endpoint))
            .json(&json!({ "query": query, "texts": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::BackendResponse {
                backend: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let entries: Vec<RerankEntry> = response.json().await?;

        let mut slots: Vec<Option<Chunk>> = candidates.into_iter().map(Some).collect();
        let mut ranked = Vec::with_capacity(entries.len());
        for entry in entries {
            let chunk = slots
                .get_mut(entry.index)
                .and_then(Option::take)
                .ok_or_else(|| ServiceError::BackendResponse {
                    backend: "reranker".to_string(),
                    details: format!("score index {} duplicate or out of range", entry.index),
                })?;
            ranked.push(ScoredChunk {
                chunk,
                score: entry.score,
            });
        }

        ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
        ranked.truncate(top_n);
        Ok(ranked)
    }
}
