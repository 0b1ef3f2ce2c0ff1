//! Hybrid query planning
//!
//! A query runs against both indexes with the same candidate filter, scores
//! are normalized per side and blended by `alpha`, and the top hits are
//! materialized with citations.

mod fusion;
mod snippet;

pub use fusion::*;
pub use snippet::*;

use crate::chunk::{Chunk, FileType};
use crate::config::SearchConfig;
use crate::error::{QuarryError, Result};
use crate::extract::text::normalize_tag;
use crate::index::{KeywordIndex, VectorIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Default dense/keyword blend
pub const DEFAULT_ALPHA: f32 = 0.5;

/// Restrictions applied to the candidate population before ranking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Accept any of these file types (empty accepts all)
    #[serde(default)]
    pub types: Vec<FileType>,
    /// Require every one of these tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.tags.is_empty()
    }

    fn accepts(&self, chunk: &Chunk, tags: &[String]) -> bool {
        (self.types.is_empty() || self.types.contains(&chunk.file_type))
            && tags.iter().all(|t| chunk.tags.contains(t))
    }
}

/// Search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: usize,
    pub alpha: f32,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Attach the per-side score breakdown to each hit
    #[serde(default)]
    pub explain: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            alpha: DEFAULT_ALPHA,
            filters: SearchFilters::default(),
            explain: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_types(mut self, types: Vec<FileType>) -> Self {
        self.filters.types = types;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.filters.tags = tags;
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    /// Alpha clamped into [0, 1]; NaN is rejected
    pub fn effective_alpha(&self) -> Result<f32> {
        if self.alpha.is_nan() {
            return Err(QuarryError::InvalidInput("alpha must be a number".to_string()));
        }
        Ok(self.alpha.clamp(0.0, 1.0))
    }

    /// True when the request can only produce an empty result
    pub fn is_trivially_empty(&self) -> bool {
        self.k == 0 || self.query.trim().is_empty()
    }
}

/// Source location of a hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<usize>,
    pub snippet: String,
}

/// Per-side score breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplain {
    pub dense: f32,
    pub keyword: f32,
    pub alpha: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
}

/// A ranked chunk with its citation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
    pub text_excerpt: String,
    pub citation: Citation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplain>,
}

/// Search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
        }
    }
}

/// Read-only view of the state a query runs against
pub(crate) struct SearchContext<'a> {
    pub chunks: &'a BTreeMap<String, Chunk>,
    pub vectors: &'a VectorIndex,
    pub keywords: &'a KeywordIndex,
    pub config: &'a SearchConfig,
}

impl SearchContext<'_> {
    /// Ids passing `filters`, or `None` when nothing is filtered
    fn allowed_ids(&self, filters: &SearchFilters, tags: &[String]) -> Option<HashSet<String>> {
        if filters.is_empty() {
            return None;
        }
        Some(
            self.chunks
                .values()
                .filter(|chunk| filters.accepts(chunk, tags))
                .map(|chunk| chunk.id.clone())
                .collect(),
        )
    }

    /// Rank chunks for `request` given its already-embedded query vector
    pub fn execute(
        &self,
        request: &SearchRequest,
        alpha: f32,
        query_vector: &[f32],
    ) -> Result<Vec<SearchHit>> {
        let tags: Vec<String> = request
            .filters
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();
        let allowed = self.allowed_ids(&request.filters, &tags);
        if allowed.as_ref().is_some_and(|a| a.is_empty()) {
            return Ok(Vec::new());
        }

        let fanout = self.config.fanout.max(request.k);
        let dense: Vec<(String, f32)> = self
            .vectors
            .search(query_vector, fanout, allowed.as_ref())?
            .into_iter()
            .map(|m| (m.id, m.score))
            .collect();
        let keyword: Vec<String> = self
            .keywords
            .search(&request.query, fanout, &tags, allowed.as_ref())
            .into_iter()
            .map(|m| m.id)
            .collect();

        tracing::debug!(
            "Query '{}': {} dense, {} keyword candidates (alpha {})",
            request.query,
            dense.len(),
            keyword.len(),
            alpha
        );

        let mut fused = fuse(&dense, &keyword, alpha);
        fused.truncate(request.k);

        Ok(fused
            .into_iter()
            .filter_map(|candidate| {
                let chunk = self.chunks.get(&candidate.id)?;
                Some(self.materialize(chunk, candidate, request, alpha))
            })
            .collect())
    }

    fn materialize(
        &self,
        chunk: &Chunk,
        candidate: FusedCandidate,
        request: &SearchRequest,
        alpha: f32,
    ) -> SearchHit {
        let snippet = extract_snippet(&chunk.text, &request.query, self.config.snippet_chars);
        let explain = request.explain.then(|| ScoreExplain {
            dense: candidate.dense,
            keyword: candidate.keyword,
            alpha,
            dense_rank: candidate.dense_rank,
            keyword_rank: candidate.keyword_rank,
        });
        SearchHit {
            chunk_id: chunk.id.clone(),
            score: candidate.score,
            text_excerpt: truncate_excerpt(&chunk.text, self.config.excerpt_chars),
            citation: Citation {
                file_path: chunk.path.clone(),
                page: chunk.page,
                start_offset: chunk.offset_start,
                end_offset: chunk.offset_end,
                snippet: snippet.snippet,
            },
            explain,
        }
    }
}
