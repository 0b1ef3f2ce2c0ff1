//! Terminal output formatter

use super::{location, FormatOptions};
use quarry_core::SearchHit;

pub fn format_results(results: &[SearchHit], options: &FormatOptions) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut output = String::new();

    for hit in results {
        let score_pct = (hit.score * 100.0).round() as u32;
        output.push_str(&format!("{:>3}% {}\n", score_pct, location(hit)));
        output.push_str(&format!("     {}\n", hit.citation.snippet.replace('\n', " ")));

        if let (true, Some(explain)) = (options.explain, &hit.explain) {
            let rank = |r: Option<usize>| r.map_or("-".to_string(), |r| (r + 1).to_string());
            output.push_str(&format!(
                "     dense {:.3} (#{}) keyword {:.3} (#{}) alpha {:.2}\n",
                explain.dense,
                rank(explain.dense_rank),
                explain.keyword,
                rank(explain.keyword_rank),
                explain.alpha
            ));
        }

        if options.full {
            let lines: Vec<&str> = hit.text_excerpt.lines().take(5).collect();
            for line in &lines {
                output.push_str(&format!("  | {}\n", line));
            }
            if hit.text_excerpt.lines().count() > 5 {
                output.push_str("  | ...\n");
            }
        }
    }

    output
}
