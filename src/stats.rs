//! Collection statistics.
//!
//! A read-only view of [`CollectionStore::stats`] for `ctxv stats`.

use anyhow::Result;

use crate::collection::CollectionStore;
use crate::config::Config;
use crate::models::CollectionStats;

/// Run the stats command: count the project's collection and print a summary.
pub async fn run_stats(config: &Config, project_id: &str, json: bool) -> Result<()> {
    let collection = CollectionStore::open(config, project_id).await?;
    let stats = collection.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", render_stats(&stats));
    }
    Ok(())
}

fn render_stats(stats: &CollectionStats) -> String {
    format!(
        "Project: {} ({})\nTotal items: {}\nDB path: {}\n",
        stats.project_name, stats.project_id, stats.total_items, stats.storage_path
    )
}
