//! Markdown output formatter

use super::{location, FormatOptions};
use quarry_core::SearchResponse;

pub fn format_results(response: &SearchResponse, options: &FormatOptions) -> String {
    let mut output = format!("# Results for \"{}\"\n\n", response.query);

    if response.results.is_empty() {
        output.push_str("_No results._\n");
        return output;
    }

    for (i, hit) in response.results.iter().enumerate() {
        output.push_str(&format!(
            "{}. **{}** ({:.3})\n\n   > {}\n\n",
            i + 1,
            location(hit),
            hit.score,
            hit.citation.snippet.replace('\n', " ")
        ));
        if options.full {
            output.push_str("   ```\n");
            for line in hit.text_excerpt.lines() {
                output.push_str(&format!("   {}\n", line));
            }
            output.push_str("   ```\n\n");
        }
    }

    output
}
