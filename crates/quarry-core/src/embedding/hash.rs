//! Deterministic local embedder based on feature hashing

use super::Embedder;
use crate::error::Result;
use crate::index::tokenize;
use async_trait::async_trait;

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Weight of a character trigram relative to a whole token
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedder hashing tokens and character trigrams into a fixed vector
///
/// Texts sharing vocabulary land close together, which is enough for local
/// use and tests without a model server.
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self::with_model(dimensions, &format!("hash-{}", dimensions))
    }

    pub fn with_model(dimensions: usize, model: &str) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: model.to_string(),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&bytes[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }

    /// Embed synchronously; the async trait methods delegate here
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            self.add_feature(&mut vector, &token, 1.0);

            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &format!("3:{}", trigram), TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
