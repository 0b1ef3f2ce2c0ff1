//! BM25 keyword index
//!
//! Each chunk id maps to its token list and tag set. Postings, term
//! frequencies and length statistics are derived and rebuilt after load.

use super::tokenize::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// BM25 term frequency saturation
pub const BM25_K1: f32 = 1.2;
/// BM25 length normalization
pub const BM25_B: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct KeywordDoc {
    seq: u64,
    tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KeywordSnapshot {
    next_seq: u64,
    docs: BTreeMap<String, KeywordDoc>,
}

/// Scored id returned by [`KeywordIndex::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub id: String,
    pub score: f32,
    seq: u64,
}

impl KeywordMatch {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Inverted keyword index with BM25 scoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "KeywordSnapshot")]
pub struct KeywordIndex {
    next_seq: u64,
    docs: BTreeMap<String, KeywordDoc>,
    #[serde(skip)]
    postings: HashMap<String, HashMap<String, u32>>,
    #[serde(skip)]
    total_tokens: usize,
}

impl From<KeywordSnapshot> for KeywordIndex {
    fn from(snapshot: KeywordSnapshot) -> Self {
        let mut index = Self {
            next_seq: snapshot.next_seq,
            docs: snapshot.docs,
            postings: HashMap::new(),
            total_tokens: 0,
        };
        index.rebuild_postings();
        index
    }
}

impl PartialEq for KeywordIndex {
    fn eq(&self, other: &Self) -> bool {
        self.next_seq == other.next_seq && self.docs == other.docs
    }
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    /// Number of distinct indexed terms
    #[cfg(test)]
    fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    fn rebuild_postings(&mut self) {
        self.postings.clear();
        self.total_tokens = 0;
        let docs = std::mem::take(&mut self.docs);
        for (id, doc) in &docs {
            self.add_postings(id, &doc.tokens);
        }
        self.docs = docs;
    }

    fn add_postings(&mut self, id: &str, tokens: &[String]) {
        self.total_tokens += tokens.len();
        for token in tokens {
            *self
                .postings
                .entry(token.clone())
                .or_default()
                .entry(id.to_string())
                .or_insert(0) += 1;
        }
    }

    fn remove_postings(&mut self, id: &str, tokens: &[String]) {
        self.total_tokens = self.total_tokens.saturating_sub(tokens.len());
        for token in tokens {
            if let Some(posting) = self.postings.get_mut(token) {
                posting.remove(id);
                if posting.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
    }

    /// Tokenize `text` and index it under `id`, replacing any previous entry
    pub fn upsert(&mut self, id: &str, text: &str, tags: &[String]) {
        self.remove(id);

        let tokens = tokenize(text);
        self.add_postings(id, &tokens);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.docs.insert(
            id.to_string(),
            KeywordDoc {
                seq,
                tokens,
                tags: tags.iter().cloned().collect(),
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.docs.remove(id) {
            Some(doc) => {
                self.remove_postings(id, &doc.tokens);
                true
            }
            None => false,
        }
    }

    /// Rank ids by BM25 against `query`, best first
    ///
    /// Only ids whose tag set contains every tag in `tag_filter`, and (when
    /// given) that are members of `allowed`, are ranked. Ties keep insertion
    /// order.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        tag_filter: &[String],
        allowed: Option<&HashSet<String>>,
    ) -> Vec<KeywordMatch> {
        if limit == 0 || self.docs.is_empty() {
            return Vec::new();
        }

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Vec::new();
        }

        let doc_count = self.docs.len() as f32;
        let avg_len = (self.total_tokens as f32 / doc_count).max(1.0);
        let mut scores: HashMap<&str, f32> = HashMap::new();

        for term in &terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f32;
            let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();

            for (id, tf) in posting {
                let Some(doc) = self.docs.get(id) else {
                    continue;
                };
                let tf = *tf as f32;
                let len_norm = 1.0 - BM25_B + BM25_B * doc.tokens.len() as f32 / avg_len;
                let term_score = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
                *scores.entry(id.as_str()).or_insert(0.0) += term_score;
            }
        }

        let mut matches: Vec<KeywordMatch> = scores
            .into_iter()
            .filter(|(id, _)| allowed.map_or(true, |set| set.contains(*id)))
            .filter_map(|(id, score)| {
                let doc = self.docs.get(id)?;
                if !tag_filter.iter().all(|t| doc.tags.contains(t)) {
                    return None;
                }
                Some(KeywordMatch {
                    id: id.to_string(),
                    score,
                    seq: doc.seq,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
        matches.truncate(limit);
        matches
    }
}
