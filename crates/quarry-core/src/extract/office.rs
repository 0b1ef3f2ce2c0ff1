//! Zip-packaged document formats: Word (`.docx`) and Pages (`.pages`)

use super::pdf::PdfExtractor;
use super::{ChunkOptions, Extractor};
use crate::chunk::{ChunkDraft, FileType};
use crate::error::{QuarryError, Result};
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::Path;

/// Maximum decompressed bytes read from a single archive entry
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive<'a>(path: &Path, bytes: &'a [u8]) -> Result<Archive<'a>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| QuarryError::extraction(path, format!("invalid archive: {}", e)))
}

/// Read a named entry, `None` if the archive lacks it
fn read_entry(path: &Path, archive: &mut Archive<'_>, name: &str) -> Result<Option<Vec<u8>>> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(QuarryError::extraction(path, e)),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| QuarryError::extraction(path, e))?;
    if out.len() as u64 >= MAX_ENTRY_BYTES {
        return Err(QuarryError::extraction(
            path,
            format!("archive entry {} exceeds size limit", name),
        ));
    }
    Ok(Some(out))
}

/// Collect text of `text_element` nodes, ending a paragraph at each `para_element`
fn collect_paragraphs(
    path: &Path,
    xml: &[u8],
    text_element: &[u8],
    para_element: &[u8],
) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == text_element => in_text = true,
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == text_element {
                    in_text = false;
                }
                if name.as_ref() == para_element && !out.is_empty() && !out.ends_with("\n\n") {
                    out.push_str("\n\n");
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| QuarryError::extraction(path, e))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(QuarryError::extraction(path, format!("malformed XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Extractor for Office Open XML word documents
pub struct DocxExtractor {
    options: ChunkOptions,
}

impl DocxExtractor {
    pub fn new(options: ChunkOptions) -> Self {
        Self { options }
    }
}

impl Extractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Word]
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let mut archive = open_archive(path, bytes)?;
        let xml = read_entry(path, &mut archive, "word/document.xml")?
            .ok_or_else(|| QuarryError::extraction(path, "word/document.xml not found"))?;
        let text = collect_paragraphs(path, &xml, b"t", b"p")?;
        Ok(self.options.split(&text, 0))
    }
}

/// Extractor for Pages documents
///
/// Legacy bundles carry their text in `index.xml`. Current bundles store an
/// opaque body, so the embedded `QuickLook/Preview.pdf` is used instead.
pub struct PagesExtractor {
    options: ChunkOptions,
    pdf: PdfExtractor,
}

impl PagesExtractor {
    pub fn new(options: ChunkOptions) -> Self {
        Self {
            options,
            pdf: PdfExtractor::new(options),
        }
    }
}

impl Extractor for PagesExtractor {
    fn name(&self) -> &'static str {
        "pages"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Pages]
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let mut archive = open_archive(path, bytes)?;

        if let Some(xml) = read_entry(path, &mut archive, "index.xml")? {
            let text = collect_paragraphs(path, &xml, b"p", b"p")?;
            return Ok(self.options.split(&text, 0));
        }

        if let Some(pdf) = read_entry(path, &mut archive, "QuickLook/Preview.pdf")? {
            return self.pdf.extract_pages(path, &pdf);
        }

        Err(QuarryError::extraction(
            path,
            "no index.xml or QuickLook/Preview.pdf in Pages bundle",
        ))
    }
}
