//! JSON output formatter

use quarry_core::SearchResponse;

pub fn format_results(response: &SearchResponse) -> String {
    serde_json::to_string_pretty(response).unwrap_or_else(|_| "{}".to_string()) + "\n"
}
