//! Stats command

use crate::app::OutputFormat;
use anyhow::Result;
use quarry_core::KnowledgeStore;

pub async fn run(store: &KnowledgeStore, format: OutputFormat) -> Result<()> {
    let stats = store.stats().await;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("Files:           {}", stats.files);
            println!("Chunks:          {}", stats.total_chunks);
            for (file_type, count) in &stats.chunks_by_type {
                println!("  {:<14} {}", format!("{}:", file_type), count);
            }
            println!("Avg chunk chars: {:.0}", stats.average_chunk_length);
            if stats.partial_files > 0 {
                println!("Partial files:   {}", stats.partial_files);
            }
            println!();
            println!("Embeddings:");
            println!("  Vectors:       {}", stats.embedding_count);
            if let Some(dimensions) = stats.dimensions {
                println!("  Dimensions:    {}", dimensions);
            }
            println!("  Model:         {}", store.embedder().model_name());
            println!("  Cached:        {}", stats.cache.corpus_entries);
            println!();
            match stats.last_indexed {
                Some(at) => println!("Last indexed:    {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last indexed:    never"),
            }
        }
    }
    Ok(())
}
