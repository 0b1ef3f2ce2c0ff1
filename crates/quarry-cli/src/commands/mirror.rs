//! Mirror sync command

use crate::app::OutputFormat;
use anyhow::Result;
use quarry_core::KnowledgeStore;

pub async fn run(store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let report = store.sync_mirror().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("Uploaded:          {}", report.uploaded);
            println!("Unchanged:         {}", report.skipped);
            println!("Deleted:           {}", report.deleted);
            println!("Snapshots pruned:  {}", report.snapshots_pruned);
        }
    }
    Ok(())
}
