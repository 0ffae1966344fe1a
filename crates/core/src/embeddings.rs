use crate::error::ServiceError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

/// Client for a text-embeddings-inference style service: one `POST /embed`
/// call embeds a whole batch of texts.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
}

impl HttpEmbedder {
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
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ServiceError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "service returned an empty batch".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(ServiceError::Request("cannot embed empty text".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/embed", self.endpoint))
            .json(&json!({ "inputs": texts, "truncate": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let vectors: Vec<Vec<f32>> = response.json().await?;
        if vectors.len() != texts.len() {
            return Err(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            });
        }

        Ok(vectors)
    }
}
