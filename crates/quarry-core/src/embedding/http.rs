//! HTTP-based embedder for OpenAI-compatible services (vLLM, OpenAI, Ollama)

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{QuarryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Embedder that calls `POST {url}/v1/embeddings`
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    config: EmbeddingConfig,
    dimensions: AtomicUsize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create from configuration
    pub fn from_config(config: EmbeddingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let dimensions = AtomicUsize::new(config.dimensions.unwrap_or(0));
        Ok(Self {
            http_client,
            config,
            dimensions,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.config.url.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut req = self.http_client.post(self.endpoint()).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QuarryError::ExternalError(format!(
                "Embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let mut data = response.json::<EmbedResponse>().await?.data;
        if data.len() != texts.len() {
            return Err(QuarryError::Embedding(format!(
                "expected {} embeddings, service returned {}",
                texts.len(),
                data.len()
            )));
        }
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(first) = vectors.first() {
            let expected = self.dimensions.load(Ordering::Relaxed);
            if expected == 0 {
                self.dimensions.store(first.len(), Ordering::Relaxed);
            } else if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(QuarryError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            tracing::debug!("Embedding batch of {} via {}", batch.len(), self.endpoint());
            all_embeddings.extend(self.request(batch).await?);
        }
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.load(Ordering::Relaxed)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
