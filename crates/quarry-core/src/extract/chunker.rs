//! Character-window chunking with natural break points

/// A span of source text with byte offsets into the chunked string
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Split `content` into overlapping windows of roughly `chunk_size` bytes
///
/// Windows prefer to end on a paragraph break, then a sentence end, then a
/// newline, then a space, searched within the last 30% of the window.
/// Whitespace-only windows are dropped, so blank input yields no spans.
pub fn chunk_by_chars(content: &str, chunk_size: usize, overlap: usize) -> Vec<TextSpan> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    if content.len() <= chunk_size {
        return vec![TextSpan {
            text: content.to_string(),
            start: 0,
            end: content.len(),
        }];
    }

    let mut spans = Vec::new();
    let mut start = 0;

    while start < content.len() {
        let raw_end = (start + chunk_size).min(content.len());
        let end = floor_char_boundary(content, raw_end);
        let mut chunk_end = end;

        // Find natural break point in last 30%
        if end < content.len() {
            let search_start_raw = start + (chunk_size * 70 / 100);
            let search_start = ceil_char_boundary(content, search_start_raw);

            if search_start < end {
                let search_region = &content[search_start..end];

                if let Some(pos) = search_region.rfind("\n\n") {
                    chunk_end = search_start + pos + 2;
                } else if let Some(pos) = search_region.rfind(". ") {
                    chunk_end = search_start + pos + 2;
                } else if let Some(pos) = search_region.rfind('\n') {
                    chunk_end = search_start + pos + 1;
                } else if let Some(pos) = search_region.rfind(' ') {
                    chunk_end = search_start + pos + 1;
                }
            }
        }

        chunk_end = floor_char_boundary(content, chunk_end);
        if chunk_end <= start {
            // A single multi-byte char wider than the window
            chunk_end = ceil_char_boundary(content, start + 1);
        }

        let text = &content[start..chunk_end];
        if !text.trim().is_empty() {
            spans.push(TextSpan {
                text: text.to_string(),
                start,
                end: chunk_end,
            });
        }

        if chunk_end >= content.len() {
            break;
        }

        let next = ceil_char_boundary(content, chunk_end.saturating_sub(overlap));
        start = if next > start { next } else { chunk_end };
    }

    spans
}
