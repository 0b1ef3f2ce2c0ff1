//! Search and document retrieval

use super::KnowledgeStore;
use crate::chunk::Chunk;
use crate::embedding::query_identity;
use crate::error::{QuarryError, Result};
use crate::paths::normalize_path;
use crate::search::{SearchContext, SearchRequest, SearchResponse};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Text of an indexed document reassembled from its chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub text: String,
}

impl KnowledgeStore {
    /// Hybrid dense + keyword search
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let alpha = request.effective_alpha()?;
        if request.is_trivially_empty() {
            return Ok(SearchResponse::empty(&request.query));
        }

        let query_vector = self
            .cache
            .embed_text(
                self.embedder.as_ref(),
                &request.query,
                &query_identity(&request.query),
            )
            .await?;

        let state = self.state.read().await;
        let context = SearchContext {
            chunks: &state.chunks,
            vectors: &state.vectors,
            keywords: &state.keywords,
            config: &self.config.search,
        };
        let results = context.execute(request, alpha, &query_vector)?;

        Ok(SearchResponse {
            query: request.query.clone(),
            results,
        })
    }

    /// Reassemble an indexed file, optionally a single page of it
    ///
    /// Chunks are ordered by page, then start offset, then ordinal, and
    /// joined with a blank line.
    pub async fn get_document(&self, path: &Path, page: Option<u32>) -> Result<Document> {
        let relative = normalize_path(&self.config.base_dir, path);
        let state = self.state.read().await;

        let record = state
            .manifest
            .get(&relative)
            .filter(|r| !r.chunk_ids.is_empty())
            .ok_or_else(|| QuarryError::NotIndexed(relative.clone()))?;

        let mut chunks: Vec<&Chunk> = record
            .chunk_ids
            .iter()
            .filter_map(|id| state.chunks.get(id))
            .filter(|chunk| page.is_none() || chunk.page == page)
            .collect();
        if chunks.is_empty() {
            let target = match page {
                Some(page) => format!("{} page {}", relative, page),
                None => relative,
            };
            return Err(QuarryError::NotIndexed(target));
        }

        chunks.sort_by_key(|chunk| (chunk.page, chunk.offset_start, chunk.ordinal));
        let text = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Document {
            path: relative,
            page,
            text,
        })
    }
}
