//! Dense vector index
//!
//! Flat id → vector map searched by brute-force cosine similarity.

use crate::error::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Convert embedding to bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes back to embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Serde adapter storing `Vec<f32>` as base64 of little-endian bytes
pub mod base64_f32 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vector: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(super::embedding_to_bytes(vector)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(serde::de::Error::custom(format!(
                "vector blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(super::bytes_to_embedding(&bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VectorEntry {
    seq: u64,
    #[serde(with = "base64_f32")]
    vector: Vec<f32>,
}

/// Scored id returned by [`VectorIndex::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Raw cosine similarity in [-1, 1]
    pub score: f32,
    seq: u64,
}

impl VectorMatch {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Flat dense vector index with a fixed dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimensions: Option<usize>,
    next_seq: u64,
    entries: BTreeMap<String, VectorEntry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension fixed by the first inserted vector
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.entries.get(id).map(|e| e.vector.as_slice())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        match self.dimensions {
            Some(expected) if expected != actual => {
                Err(QuarryError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Insert or replace the vector for `id`
    pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(QuarryError::InvalidInput(format!(
                "empty vector for chunk {}",
                id
            )));
        }
        self.check_dimensions(vector.len())?;
        self.dimensions = Some(vector.len());

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id.to_string(), VectorEntry { seq, vector });
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if self.entries.is_empty() {
            self.dimensions = None;
        }
        removed
    }

    /// Top `limit` ids by cosine similarity, ties broken by insertion order
    ///
    /// When `allowed` is given only those ids are considered.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<VectorMatch>> {
        if limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensions(query.len())?;

        let mut matches: Vec<VectorMatch> = self
            .entries
            .iter()
            .filter(|(id, _)| allowed.map_or(true, |set| set.contains(id.as_str())))
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(query, &entry.vector),
                seq: entry.seq,
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_roundtrip() {
        let original = vec![1.0f32, 2.0, 3.0, -1.5];
        let bytes = embedding_to_bytes(&original);
        let restored = bytes_to_embedding(&bytes);
        assert_eq!(original, restored);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut index = VectorIndex::new();
        index.upsert("far", vec![0.0, 1.0]).unwrap();
        index.upsert("near", vec![1.0, 0.1]).unwrap();
        index.upsert("opposite", vec![-1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 10, None).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far", "opposite"]);
        assert!(hits[2].score < 0.0);
    }

    #[test]
    fn test_ties_break_by_insertion() {
        let mut index = VectorIndex::new();
        index.upsert("z", vec![1.0, 0.0]).unwrap();
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].id, "z");
        assert_eq!(hits[1].id, "a");
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorIndex::new();
        index.upsert("a", vec![1.0, 0.0, 0.0]).unwrap();
        let err = index.upsert("b", vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.search(&[1.0], 1, None).is_err());
    }

    #[test]
    fn test_remove_and_allowed_filter() {
        let mut index = VectorIndex::new();
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        index.upsert("b", vec![0.9, 0.1]).unwrap();

        let allowed: HashSet<String> = ["b".to_string()].into_iter().collect();
        let hits = index.search(&[1.0, 0.0], 5, Some(&allowed)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");

        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_empty_index_resets_dimension() {
        let mut index = VectorIndex::new();
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        index.remove("a");
        assert_eq!(index.dimensions(), None);
        index.upsert("b", vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.dimensions(), Some(3));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut index = VectorIndex::new();
        index.upsert("a", vec![0.25, -0.5]).unwrap();
        index.upsert("b", vec![1.0, 2.0]).unwrap();

        let json = serde_json::to_string(&index).unwrap();
        assert!(json.contains("\"vector\":\""));
        let restored: VectorIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, index);
    }
}
