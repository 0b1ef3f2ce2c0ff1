//! PDF extraction, one page at a time

use super::{ChunkOptions, Extractor};
use crate::chunk::{ChunkDraft, FileType};
use crate::error::{QuarryError, Result};
use std::path::Path;

/// Extractor for PDF files
pub struct PdfExtractor {
    options: ChunkOptions,
}

impl PdfExtractor {
    pub fn new(options: ChunkOptions) -> Self {
        Self { options }
    }

    /// Chunk already-loaded PDF bytes; offsets are relative to each page
    pub(crate) fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| QuarryError::extraction(path, format!("failed to read PDF: {}", e)))?;

        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(QuarryError::extraction(
                path,
                "PDF contains no extractable text (may be image-based)",
            ));
        }

        let mut drafts = Vec::new();
        for (index, page_text) in pages.iter().enumerate() {
            let page = index as u32 + 1;
            drafts.extend(
                self.options
                    .split(page_text, 0)
                    .into_iter()
                    .map(|draft| draft.with_page(page)),
            );
        }
        Ok(drafts)
    }
}

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Pdf]
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        self.extract_pages(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pdf_is_extraction_error() {
        let err = PdfExtractor::new(ChunkOptions::default())
            .extract(Path::new("broken.pdf"), b"not a pdf")
            .unwrap_err();
        assert!(matches!(err, QuarryError::Extraction { .. }));
        assert!(err.to_string().contains("broken.pdf"));
    }
}
