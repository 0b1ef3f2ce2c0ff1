//! Get document command

use crate::app::{GetArgs, OutputFormat};
use anyhow::Result;
use quarry_core::KnowledgeStore;

pub async fn run(args: GetArgs, store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let document = store.get_document(&args.file, args.page).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Files => println!("{}", document.path),
        OutputFormat::Md => {
            match document.page {
                Some(page) => println!("# {} (page {})\n", document.path, page),
                None => println!("# {}\n", document.path),
            }
            println!("{}", document.text);
        }
        OutputFormat::Cli => {
            for (i, line) in document.text.lines().enumerate() {
                if args.line_numbers {
                    println!("{:>4} {}", i + 1, line);
                } else {
                    println!("{}", line);
                }
            }
        }
    }
    Ok(())
}
