//! Fetch command - Run a root batch through the prefetch engine

use anyhow::{Context, Result};
use clap::Args;
use itempath_core::{Item, Query};
use serde::Serialize;

use super::{describe_item, CommandContext};

/// Arguments for the fetch command
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Class of the root items
    class: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FetchOutput<'a> {
    rows: Vec<&'a Item>,
    prefetched: Vec<&'a Item>,
    stats: &'a itempath_core::SweepStats,
    cached_descriptions: usize,
}

/// Execute the fetch command
pub fn execute(args: FetchArgs, ctx: &CommandContext) -> Result<()> {
    let store = ctx.path_following_store()?;
    let results = store
        .execute_batch(&Query::items_of_class(&args.class))
        .with_context(|| format!("Failed to fetch {} items", args.class))?;

    let rows = results
        .iter()
        .map(|row| row.item(0).map(|item| item.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    if args.json {
        let output = FetchOutput {
            rows,
            prefetched: results.holder().items().map(|item| item.as_ref()).collect(),
            stats: results.stats(),
            cached_descriptions: store.cache().len(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {} item(s)", rows.len(), args.class);
    for item in &rows {
        println!("  {}", describe_item(item));
    }

    if !store.is_prefetching() {
        println!("\nPrefetching disabled (no descriptors)");
        return Ok(());
    }

    println!("\nPrefetched {} item(s)", results.holder().len());
    for item in results.holder().items() {
        println!("  {}", describe_item(item));
    }

    let stats = results.stats();
    println!("\nSweep");
    println!("  Work items:         {}", stats.work_items);
    println!("  Batch queries:      {}", stats.queries);
    println!("  Cache hits:         {}", stats.cache_hits);
    println!("  Skipped singletons: {}", stats.skipped_singletons);
    println!("  Items fetched:      {}", stats.items_fetched);
    println!("  Unresolved:         {}", stats.unresolved);
    println!("  Cached descriptions: {}", store.cache().len());
    Ok(())
}
