//! File list output formatter

use quarry_core::SearchHit;
use std::collections::BTreeSet;

/// One line per distinct file, in rank order of its best hit
pub fn format_results(results: &[SearchHit]) -> String {
    let mut seen = BTreeSet::new();
    let mut output = String::new();
    for hit in results {
        if seen.insert(hit.citation.file_path.as_str()) {
            output.push_str(&hit.citation.file_path);
            output.push('\n');
        }
    }
    output
}
