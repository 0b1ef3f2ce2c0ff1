//! Chunk types and content-addressed identities

use crate::error::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Declared type of an indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Markdown,
    Text,
    Word,
    Pages,
}

impl FileType {
    pub const ALL: [FileType; 5] = [
        Self::Pdf,
        Self::Markdown,
        Self::Text,
        Self::Word,
        Self::Pages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Word => "word",
            Self::Pages => "pages",
        }
    }

    /// Map a file extension (case-insensitive, without the dot) to a type
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "md" | "markdown" | "mdx" => Some(Self::Markdown),
            "txt" | "text" | "log" | "rst" => Some(Self::Text),
            "docx" => Some(Self::Word),
            "pages" => Some(Self::Pages),
            _ => None,
        }
    }

    /// Detect the type of a file from its extension
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| QuarryError::UnsupportedFileType {
            path: path.to_path_buf(),
            extension: ext.to_string(),
        })
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "markdown" | "md" => Some(Self::Markdown),
            "text" | "txt" => Some(Self::Text),
            "word" | "docx" => Some(Self::Word),
            "pages" => Some(Self::Pages),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunk produced by an extractor, before the store assigns identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkDraft {
    pub text: String,
    /// 1-based page number for paginated formats
    pub page: Option<u32>,
    pub offset_start: Option<usize>,
    pub offset_end: Option<usize>,
    pub tags: Vec<String>,
}

impl ChunkDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_offsets(mut self, start: usize, end: usize) -> Self {
        self.offset_start = Some(start);
        self.offset_end = Some(end);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Indexed unit of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    /// Normalized path relative to the base directory
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_end: Option<usize>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    /// Position within the owning file's extraction
    pub ordinal: usize,
    /// Source file modification time (unix millis)
    pub mtime: i64,
}

impl Chunk {
    /// Build a chunk from an extractor draft
    pub fn from_draft(
        draft: ChunkDraft,
        path: &str,
        file_type: FileType,
        content_hash: &str,
        ordinal: usize,
        mtime: i64,
        partial: bool,
    ) -> Self {
        let id = compute_chunk_id(path, content_hash, ordinal, &draft.text);
        let token_count = Some(draft.text.split_whitespace().count());
        Self {
            id,
            path: path.to_string(),
            file_type,
            page: draft.page,
            offset_start: draft.offset_start,
            offset_end: draft.offset_end,
            text: draft.text,
            token_count,
            tags: draft.tags,
            partial,
            ordinal,
            mtime,
        }
    }

    /// Text indexed by the keyword index
    pub fn keyword_text(&self) -> &str {
        &self.text
    }
}

/// Compute the content-addressed chunk identity
///
/// Identity covers the owning path, the file content hash, the chunk ordinal
/// and its text, so a re-extraction of identical content reproduces the same
/// ids while any content change yields fresh ones.
pub fn compute_chunk_id(path: &str, content_hash: &str, ordinal: usize, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.as_bytes());
    hasher.update(&[0]);
    hasher.update(content_hash.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(ordinal as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..32].to_string()
}

/// Hash raw file content using SHA-256
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
