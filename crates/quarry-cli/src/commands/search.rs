//! Search command

use crate::app::{OutputFormat, SearchArgs};
use crate::output::{format_search_results, FormatOptions};
use anyhow::{anyhow, Result};
use quarry_core::{FileType, KnowledgeStore, SearchRequest};

pub async fn run(args: SearchArgs, store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    let types = args
        .types
        .iter()
        .map(|name| FileType::parse(name).ok_or_else(|| anyhow!("Unknown file type: {}", name)))
        .collect::<Result<Vec<_>>>()?;

    let request = SearchRequest::new(&query, args.limit)
        .with_alpha(args.alpha)
        .with_types(types)
        .with_tags(args.tags)
        .with_explain(args.explain);
    let response = store.search(&request).await?;

    let options = FormatOptions {
        full: args.full,
        explain: args.explain,
    };
    print!("{}", format_search_results(&response, format, &options));

    if response.results.is_empty() && format == OutputFormat::Cli {
        eprintln!("No results found for '{}'", query);
    }
    Ok(())
}
