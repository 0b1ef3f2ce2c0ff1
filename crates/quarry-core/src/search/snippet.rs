//! Snippet extraction for search results

use regex::RegexBuilder;

/// Extracted snippet with byte positions into the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub snippet: String,
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Extract a window of at most `max_len` bytes centred on the first query match
pub fn extract_snippet(content: &str, query: &str, max_len: usize) -> Snippet {
    // If content is short enough, return it all
    if content.len() <= max_len {
        return Snippet {
            snippet: content.to_string(),
            start_pos: 0,
            end_pos: content.len(),
        };
    }

    let center = find_query_position(content, query);

    // Calculate window
    let half_len = max_len / 2;
    let start = center.saturating_sub(half_len);
    let end = (start + max_len).min(content.len());
    let start = if end == content.len() {
        end.saturating_sub(max_len)
    } else {
        start
    };

    let (start, end) = adjust_to_word_boundaries(content, start, end, max_len);

    let mut snippet = content[start..end].trim().to_string();

    // Add ellipsis
    if start > 0 {
        snippet = format!("...{}", snippet);
    }
    if end < content.len() {
        snippet = format!("{}...", snippet);
    }

    Snippet {
        snippet,
        start_pos: start,
        end_pos: end,
    }
}

/// Truncate text to at most `max_len` bytes on a char boundary, marking the cut
pub fn truncate_excerpt(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", text[..end].trim_end())
}

/// Byte position of the whole query, else of its first matching term
fn find_query_position(content: &str, query: &str) -> usize {
    let find = |needle: &str| {
        RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .ok()
            .and_then(|re| re.find(content).map(|m| m.start()))
    };

    if let Some(pos) = find(query.trim()) {
        return pos;
    }

    query
        .split_whitespace()
        .filter(|t| t.chars().count() >= 3)
        .find_map(find)
        .unwrap_or(0)
}

fn floor_boundary(content: &str, mut index: usize) -> usize {
    index = index.min(content.len());
    while index > 0 && !content.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(content: &str, mut index: usize) -> usize {
    index = index.min(content.len());
    while index < content.len() && !content.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Widen to whole words, giving up after a bounded stretch of non-whitespace
fn adjust_to_word_boundaries(
    content: &str,
    start: usize,
    end: usize,
    max_len: usize,
) -> (usize, usize) {
    let bytes = content.as_bytes();
    let slack = (max_len / 4).max(16);

    let mut new_start = floor_boundary(content, start);
    let floor = new_start.saturating_sub(slack);
    while new_start > floor && !bytes[new_start - 1].is_ascii_whitespace() {
        new_start -= 1;
    }
    let new_start = floor_boundary(content, new_start);

    let mut new_end = ceil_boundary(content, end);
    let ceiling = (new_end + slack).min(bytes.len());
    while new_end < ceiling && !bytes[new_end].is_ascii_whitespace() {
        new_end += 1;
    }
    let new_end = ceil_boundary(content, new_end);

    (new_start, new_end)
}
