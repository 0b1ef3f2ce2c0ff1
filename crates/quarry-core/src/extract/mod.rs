//! Per-format chunk extraction
//!
//! Every supported file type maps to one [`Extractor`]. Extractors are
//! synchronous and CPU-bound; the store runs them on the blocking pool.

use crate::chunk::{ChunkDraft, FileType};
use crate::config::ChunkingConfig;
use crate::error::{QuarryError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub mod chunker;
pub mod office;
pub mod pdf;
pub mod text;

pub use chunker::{chunk_by_chars, TextSpan};
pub use office::{DocxExtractor, PagesExtractor};
pub use pdf::PdfExtractor;
pub use text::{MarkdownExtractor, TextExtractor};

/// Chunk extractor trait - one implementation per document format
pub trait Extractor: Send + Sync {
    /// Extractor identifier used in logs
    fn name(&self) -> &'static str;

    /// File types this extractor handles
    fn file_types(&self) -> &'static [FileType];

    /// Turn raw file bytes into ordered chunk drafts
    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>>;
}

/// Chunking parameters shared by the text-producing extractors
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkOptions {
    /// Chunk a block of text, shifting offsets by `base_offset`
    pub fn split(&self, content: &str, base_offset: usize) -> Vec<ChunkDraft> {
        chunk_by_chars(content, self.chunk_chars, self.overlap_chars)
            .into_iter()
            .map(|span| {
                ChunkDraft::new(span.text)
                    .with_offsets(base_offset + span.start, base_offset + span.end)
            })
            .collect()
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::from(&ChunkingConfig::default())
    }
}

impl From<&ChunkingConfig> for ChunkOptions {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_chars: config.chunk_chars,
            overlap_chars: config.overlap_chars,
        }
    }
}

/// Registry mapping file types to extractors
pub struct ExtractorRegistry {
    extractors: HashMap<FileType, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Create registry with an extractor for every supported type
    pub fn with_defaults(options: ChunkOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MarkdownExtractor::new(options)));
        registry.register(Arc::new(TextExtractor::new(options)));
        registry.register(Arc::new(PdfExtractor::new(options)));
        registry.register(Arc::new(DocxExtractor::new(options)));
        registry.register(Arc::new(PagesExtractor::new(options)));
        registry
    }

    /// Register an extractor for all of its file types, replacing earlier ones
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for file_type in extractor.file_types() {
            self.extractors.insert(*file_type, Arc::clone(&extractor));
        }
    }

    /// Get extractor by file type
    pub fn get(&self, file_type: FileType) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&file_type).cloned()
    }

    /// Extract chunk drafts from `bytes`, dispatching on `file_type`
    pub fn extract(&self, path: &Path, file_type: FileType, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let extractor = self.get(file_type).ok_or_else(|| QuarryError::UnsupportedFileType {
            path: path.to_path_buf(),
            extension: file_type.to_string(),
        })?;
        tracing::debug!(
            "Extracting {} with {} extractor ({} bytes)",
            path.display(),
            extractor.name(),
            bytes.len()
        );
        extractor.extract(path, bytes)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults(ChunkOptions::default())
    }
}
