//! Index command

use crate::app::{IndexArgs, OutputFormat};
use anyhow::Result;
use quarry_core::KnowledgeStore;

pub async fn run(args: IndexArgs, store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let summary = store.index_paths(&args.paths).await?;
    let mirror = store.wait_for_mirror().await;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "summary": summary,
                "mirror": mirror,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("Indexed:   {}", summary.indexed);
            println!("Updated:   {}", summary.updated);
            println!("Unchanged: {}", summary.skipped);
            println!("Removed:   {}", summary.removed);
            if !summary.failed.is_empty() {
                println!("Failed:    {}", summary.failed.len());
                for failure in &summary.failed {
                    println!("  {}: {}", failure.path, failure.error);
                }
            }
            if let Some(report) = mirror {
                println!(
                    "Mirror:    {} uploaded, {} unchanged, {} deleted",
                    report.uploaded, report.skipped, report.deleted
                );
            }
        }
    }
    Ok(())
}
