//! Embedding generation and caching

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

mod cache;
mod hash;
mod http;

pub use cache::{query_identity, CacheRecord, CacheSnapshot, CacheStats, EmbeddingCache};
pub use hash::HashEmbedder;
pub use http::HttpEmbedder;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions (0 while unknown)
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Build the embedder selected by configuration
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hash => {
            let dimensions = config.dimensions.unwrap_or(hash::DEFAULT_DIMENSIONS);
            Ok(Arc::new(HashEmbedder::with_model(dimensions, &config.model)))
        }
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::from_config(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_hash() {
        let mut config = EmbeddingConfig::default();
        config.provider = EmbeddingProvider::Hash;
        config.dimensions = Some(64);
        config.model = "hash-64".to_string();
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.model_name(), "hash-64");
    }

    #[test]
    fn test_from_config_http() {
        let mut config = EmbeddingConfig::default();
        config.provider = EmbeddingProvider::Http;
        config.model = "all-minilm".to_string();
        config.dimensions = Some(384);
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.model_name(), "all-minilm");
    }
}
