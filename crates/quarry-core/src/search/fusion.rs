//! Alpha-weighted score fusion of dense and keyword rankings

use std::cmp::Ordering;
use std::collections::HashMap;

/// A candidate after fusion, carrying both normalized sides
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    /// `(cos + 1) / 2`, 0 when absent from the dense side
    pub dense: f32,
    /// `1 - rank / N`, 0 when absent from the keyword side
    pub keyword: f32,
    pub dense_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
}

/// Map cosine similarity into [0, 1]
pub fn normalize_dense(cosine: f32) -> f32 {
    (cosine + 1.0) / 2.0
}

/// Rank-based keyword score: the i-th of n hits scores `1 - i/n`
pub fn normalize_keyword_rank(rank: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    1.0 - rank as f32 / total as f32
}

/// Fuse best-first dense `(id, cosine)` hits with best-first keyword ids
///
/// Every dense hit is normalized, negative cosines included; only fused
/// candidates scoring zero are dropped. Ties order by rank on the side
/// weighted more heavily, then the other side's rank, then id.
pub fn fuse(dense: &[(String, f32)], keyword: &[String], alpha: f32) -> Vec<FusedCandidate> {
    let mut candidates: HashMap<&str, FusedCandidate> = HashMap::new();

    for (rank, (id, cosine)) in dense.iter().enumerate() {
        candidates.insert(
            id.as_str(),
            FusedCandidate {
                id: id.clone(),
                score: 0.0,
                dense: normalize_dense(*cosine),
                keyword: 0.0,
                dense_rank: Some(rank),
                keyword_rank: None,
            },
        );
    }

    for (rank, id) in keyword.iter().enumerate() {
        let score = normalize_keyword_rank(rank, keyword.len());
        let entry = candidates
            .entry(id.as_str())
            .or_insert_with(|| FusedCandidate {
                id: id.clone(),
                score: 0.0,
                dense: 0.0,
                keyword: 0.0,
                dense_rank: None,
                keyword_rank: None,
            });
        if entry.keyword_rank.is_none() {
            entry.keyword = score;
            entry.keyword_rank = Some(rank);
        }
    }

    let mut fused: Vec<FusedCandidate> = candidates
        .into_values()
        .map(|mut c| {
            c.score = alpha * c.dense + (1.0 - alpha) * c.keyword;
            c
        })
        .filter(|c| c.score > 0.0)
        .collect();

    let dense_first = alpha >= 0.5;
    fused.sort_by(|a, b| {
        let rank = |r: Option<usize>| r.unwrap_or(usize::MAX);
        let (primary, secondary) = if dense_first {
            (
                rank(a.dense_rank).cmp(&rank(b.dense_rank)),
                rank(a.keyword_rank).cmp(&rank(b.keyword_rank)),
            )
        } else {
            (
                rank(a.keyword_rank).cmp(&rank(b.keyword_rank)),
                rank(a.dense_rank).cmp(&rank(b.dense_rank)),
            )
        };
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(primary)
            .then(secondary)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}
