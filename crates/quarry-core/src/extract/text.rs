//! Markdown and plain-text extractors

use super::{ChunkOptions, Extractor};
use crate::chunk::{ChunkDraft, FileType};
use crate::error::{QuarryError, Result};
use serde::Deserialize;
use std::path::Path;

/// Markdown extractor with YAML front matter tags
pub struct MarkdownExtractor {
    options: ChunkOptions,
}

impl MarkdownExtractor {
    pub fn new(options: ChunkOptions) -> Self {
        Self { options }
    }
}

impl Extractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Markdown]
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let content = decode_utf8(path, bytes)?;
        let (tags, body_start) = match split_front_matter(content) {
            Some((yaml, body_start)) => (parse_tags(path, yaml), body_start),
            None => (Vec::new(), 0),
        };
        Ok(self
            .options
            .split(&content[body_start..], body_start)
            .into_iter()
            .map(|draft| draft.with_tags(tags.clone()))
            .collect())
    }
}

/// Plain text extractor
pub struct TextExtractor {
    options: ChunkOptions,
}

impl TextExtractor {
    pub fn new(options: ChunkOptions) -> Self {
        Self { options }
    }
}

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Text]
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ChunkDraft>> {
        let content = decode_utf8(path, bytes)?;
        Ok(self.options.split(content, 0))
    }
}

fn decode_utf8<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| QuarryError::extraction(path, format!("not UTF-8: {}", e)))
}

/// Locate a leading `---` front matter block
///
/// Returns the YAML source and the byte offset where the body starts.
fn split_front_matter(content: &str) -> Option<(&str, usize)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let yaml_start = content.len() - rest.len();

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body_start = yaml_start + offset + line.len();
            return Some((yaml, body_start));
        }
        offset += line.len();
    }
    None
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    List(Vec<String>),
    Single(String),
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    tags: Option<TagList>,
}

fn parse_tags(path: &Path, yaml: &str) -> Vec<String> {
    let front_matter: FrontMatter = match serde_yaml::from_str(yaml) {
        Ok(fm) => fm,
        Err(e) => {
            tracing::debug!("Ignoring unparsable front matter in {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let raw = match front_matter.tags {
        Some(TagList::List(tags)) => tags,
        Some(TagList::Single(tags)) => tags.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    };

    let mut tags: Vec<String> = raw
        .iter()
        .map(|t| normalize_tag(t))
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Canonical form used for tag storage and tag filters
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
