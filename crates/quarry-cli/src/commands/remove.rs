//! Remove command

use crate::app::{OutputFormat, RemoveArgs};
use anyhow::Result;
use quarry_core::KnowledgeStore;

pub async fn run(args: RemoveArgs, store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let removed = store.remove_path(&args.path).await?;
    store.wait_for_mirror().await;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": args.path,
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ if removed => println!("Removed {}", args.path.display()),
        _ => println!("Not indexed: {}", args.path.display()),
    }
    Ok(())
}
