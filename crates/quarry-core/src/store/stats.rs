//! Store statistics

use super::KnowledgeStore;
use crate::embedding::CacheStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Store stats
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub total_chunks: usize,
    /// Chunk count per file type name
    pub chunks_by_type: BTreeMap<String, usize>,
    /// Mean chunk length in characters
    pub average_chunk_length: f64,
    pub embedding_count: usize,
    pub dimensions: Option<usize>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub partial_files: usize,
    pub cache: CacheStats,
}

impl KnowledgeStore {
    /// Get store statistics
    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;

        let mut chunks_by_type = BTreeMap::new();
        let mut total_chars = 0usize;
        for chunk in state.chunks.values() {
            *chunks_by_type
                .entry(chunk.file_type.to_string())
                .or_insert(0) += 1;
            total_chars += chunk.text.chars().count();
        }
        let average_chunk_length = if state.chunks.is_empty() {
            0.0
        } else {
            total_chars as f64 / state.chunks.len() as f64
        };

        StoreStats {
            files: state.manifest.files.len(),
            total_chunks: state.chunks.len(),
            chunks_by_type,
            average_chunk_length,
            embedding_count: state.vectors.len(),
            dimensions: state.vectors.dimensions(),
            last_indexed: (!state.manifest.files.is_empty()).then_some(state.manifest.updated_at),
            partial_files: state.manifest.partial_count(),
            cache: self.cache.stats(),
        }
    }
}
