//! Embedding cache keyed by (identity, model)
//!
//! Corpus entries are keyed by chunk id and persisted with the store. Query
//! entries live only in memory, in a bounded tier evicted oldest first.

use super::Embedder;
use crate::error::{QuarryError, Result};
use crate::index::base64_f32;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// Default number of query embeddings kept in memory
pub const DEFAULT_QUERY_CAPACITY: usize = 256;

const QUERY_PREFIX: &str = "query:";

/// Cache identity of a query text
pub fn query_identity(query: &str) -> String {
    format!("{}{}", QUERY_PREFIX, query)
}

type CacheKey = (String, String);

#[derive(Default)]
struct QueryTier {
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Vec<f32>>,
}

/// Persisted cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub identity: String,
    pub model: String,
    #[serde(with = "base64_f32")]
    pub vector: Vec<f32>,
}

/// Serialized form of the corpus tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: Vec<CacheRecord>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub corpus_entries: usize,
    pub query_entries: usize,
}

/// Two-tier embedding cache
pub struct EmbeddingCache {
    corpus: RwLock<HashMap<CacheKey, Vec<f32>>>,
    queries: Mutex<QueryTier>,
    query_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_query_capacity(DEFAULT_QUERY_CAPACITY)
    }

    pub fn with_query_capacity(query_capacity: usize) -> Self {
        Self {
            corpus: RwLock::new(HashMap::new()),
            queries: Mutex::new(QueryTier::default()),
            query_capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Rebuild the corpus tier from a snapshot
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let cache = Self::new();
        {
            let mut corpus = cache.corpus.write().unwrap_or_else(|e| e.into_inner());
            for record in snapshot.entries {
                corpus.insert((record.identity, record.model), record.vector);
            }
        }
        cache
    }

    /// Corpus tier as a snapshot, sorted for stable output
    pub fn snapshot(&self) -> CacheSnapshot {
        let corpus = self.corpus.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<CacheRecord> = corpus
            .iter()
            .map(|((identity, model), vector)| CacheRecord {
                identity: identity.clone(),
                model: model.clone(),
                vector: vector.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (&a.identity, &a.model).cmp(&(&b.identity, &b.model)));
        CacheSnapshot { entries }
    }

    fn is_query(identity: &str) -> bool {
        identity.starts_with(QUERY_PREFIX)
    }

    /// Look up a cached vector, counting the hit or miss
    pub fn get(&self, identity: &str, model: &str) -> Option<Vec<f32>> {
        let key = (identity.to_string(), model.to_string());
        let found = if Self::is_query(identity) {
            let tier = self.queries.lock().unwrap_or_else(|e| e.into_inner());
            tier.entries.get(&key).cloned()
        } else {
            let corpus = self.corpus.read().unwrap_or_else(|e| e.into_inner());
            corpus.get(&key).cloned()
        };

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, identity: &str, model: &str, vector: Vec<f32>) {
        let key = (identity.to_string(), model.to_string());
        if Self::is_query(identity) {
            if self.query_capacity == 0 {
                return;
            }
            let mut tier = self.queries.lock().unwrap_or_else(|e| e.into_inner());
            if tier.entries.insert(key.clone(), vector).is_none() {
                tier.order.push_back(key);
            }
            while tier.order.len() > self.query_capacity {
                if let Some(oldest) = tier.order.pop_front() {
                    tier.entries.remove(&oldest);
                }
            }
        } else {
            let mut corpus = self.corpus.write().unwrap_or_else(|e| e.into_inner());
            corpus.insert(key, vector);
        }
    }

    /// Return the cached vector for `(identity, model)` or compute and store it
    pub async fn embed_text(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        identity: &str,
    ) -> Result<Vec<f32>> {
        let model = embedder.model_name();
        if let Some(vector) = self.get(identity, model) {
            return Ok(vector);
        }
        let vector = embedder.embed(text).await?;
        self.insert(identity, model, vector.clone());
        Ok(vector)
    }

    /// Embed `(identity, text)` pairs, sending only cache misses to the embedder
    pub async fn embed_many(
        &self,
        embedder: &dyn Embedder,
        items: &[(String, String)],
    ) -> Result<Vec<Vec<f32>>> {
        let model = embedder.model_name();
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(items.len());
        let mut missing_texts = Vec::new();
        let mut missing_indices = Vec::new();

        for (i, (identity, text)) in items.iter().enumerate() {
            let cached = self.get(identity, model);
            if cached.is_none() {
                missing_texts.push(text.clone());
                missing_indices.push(i);
            }
            results.push(cached);
        }

        if !missing_texts.is_empty() {
            tracing::debug!(
                "Embedding {} of {} chunks ({} cached)",
                missing_texts.len(),
                items.len(),
                items.len() - missing_texts.len()
            );
            let computed = embedder.embed_batch(&missing_texts).await?;
            if computed.len() != missing_texts.len() {
                return Err(QuarryError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    missing_texts.len(),
                    computed.len()
                )));
            }
            for (index, vector) in missing_indices.into_iter().zip(computed) {
                self.insert(&items[index].0, model, vector.clone());
                results[index] = Some(vector);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| QuarryError::Embedding("missing embedding".to_string())))
            .collect()
    }

    /// Drop corpus entries whose identity fails `keep`
    pub fn retain_corpus<F>(&self, keep: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut corpus = self.corpus.write().unwrap_or_else(|e| e.into_inner());
        let before = corpus.len();
        corpus.retain(|(identity, _), _| keep(identity));
        before - corpus.len()
    }

    pub fn stats(&self) -> CacheStats {
        let corpus_entries = self.corpus.read().map(|c| c.len()).unwrap_or(0);
        let query_entries = self.queries.lock().map(|q| q.entries.len()).unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corpus_entries,
            query_entries,
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Counts how many texts reach the underlying embedder
    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    fn counting() -> CountingEmbedder {
        CountingEmbedder {
            inner: HashEmbedder::new(16),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_recompute_on_miss_only() {
        let cache = EmbeddingCache::new();
        let embedder = counting();

        let a = cache.embed_text(&embedder, "text", "chunk-1").await.unwrap();
        let b = cache.embed_text(&embedder, "text", "chunk-1").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.corpus_entries, 1);
    }

    #[tokio::test]
    async fn test_model_is_part_of_key() {
        let cache = EmbeddingCache::new();
        cache.insert("chunk-1", "other-model", vec![1.0]);
        assert!(cache.get("chunk-1", "hash-16").is_none());
        assert!(cache.get("chunk-1", "other-model").is_some());
    }

    #[tokio::test]
    async fn test_embed_many_batches_misses() {
        let cache = EmbeddingCache::new();
        let embedder = counting();
        cache
            .embed_text(&embedder, "first", "a")
            .await
            .unwrap();

        let items = vec![
            ("a".to_string(), "first".to_string()),
            ("b".to_string(), "second".to_string()),
        ];
        let vectors = cache.embed_many(&embedder, &items).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(vectors[1], HashEmbedder::new(16).embed_sync("second"));
    }

    #[test]
    fn test_query_tier_is_bounded_and_not_persisted() {
        let cache = EmbeddingCache::with_query_capacity(2);
        cache.insert(&query_identity("one"), "m", vec![1.0]);
        cache.insert(&query_identity("two"), "m", vec![2.0]);
        cache.insert(&query_identity("three"), "m", vec![3.0]);

        assert!(cache.get(&query_identity("one"), "m").is_none());
        assert!(cache.get(&query_identity("three"), "m").is_some());
        assert_eq!(cache.stats().query_entries, 2);
        assert!(cache.snapshot().entries.is_empty());
    }

    #[test]
    fn test_snapshot_and_retain() {
        let cache = EmbeddingCache::new();
        cache.insert("live", "m", vec![0.5, 0.25]);
        cache.insert("dead", "m", vec![1.0, 0.0]);
        assert_eq!(cache.retain_corpus(|id| id == "live"), 1);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.entries.len(), 1);
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = EmbeddingCache::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.get("live", "m"), Some(vec![0.5, 0.25]));
    }
}
