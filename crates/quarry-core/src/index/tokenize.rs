//! Lexical tokenizer shared by indexing and querying

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "he", "her", "his", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not",
        "of", "on", "or", "our", "she", "so", "such", "that", "the", "their", "them", "then",
        "there", "these", "they", "this", "to", "was", "we", "were", "what", "when", "where",
        "which", "who", "will", "with", "you", "your",
    ]
    .into_iter()
    .collect();
}

/// Split text into lowercase alphanumeric tokens
///
/// Stop words and single-character tokens are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(t.as_str()))
        .collect()
}
