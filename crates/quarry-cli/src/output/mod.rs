//! Output formatters

pub mod files;
pub mod json;
pub mod markdown;
pub mod terminal;

use crate::app::OutputFormat;
use quarry_core::SearchResponse;

/// Format options
pub struct FormatOptions {
    pub full: bool,
    pub explain: bool,
}

/// Format search results
pub fn format_search_results(
    response: &SearchResponse,
    format: OutputFormat,
    options: &FormatOptions,
) -> String {
    match format {
        OutputFormat::Json => json::format_results(response),
        OutputFormat::Md => markdown::format_results(response, options),
        OutputFormat::Files => files::format_results(&response.results),
        OutputFormat::Cli => terminal::format_results(&response.results, options),
    }
}

/// Human-readable location of a hit: `path`, `path p.N` or `path:start-end`
pub(crate) fn location(hit: &quarry_core::SearchHit) -> String {
    let citation = &hit.citation;
    let mut out = citation.file_path.clone();
    if let Some(page) = citation.page {
        out.push_str(&format!(" p.{}", page));
    }
    if let (Some(start), Some(end)) = (citation.start_offset, citation.end_offset) {
        out.push_str(&format!(":{}-{}", start, end));
    }
    out
}
