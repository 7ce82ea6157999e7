//! Stats command - Show store contents and configured descriptors

use anyhow::Result;
use clap::Args;
use itempath_core::ObjectStore;

use super::CommandContext;

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the stats command
pub fn execute(args: StatsArgs, ctx: &CommandContext) -> Result<()> {
    let store = ctx.open_store()?;
    let item_count = store.item_count()?;
    let classes = store.class_counts()?;
    let prefetch = &ctx.config.prefetch;

    if args.json {
        let descriptors: Vec<_> = prefetch
            .descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "owner_class": d.owner_class,
                    "root": d.root,
                    "fields": d.fields.len(),
                    "children": d.children,
                })
            })
            .collect();
        let output = serde_json::json!({
            "database": ctx.database_path(),
            "sequence": store.sequence(),
            "items": item_count,
            "classes": classes.iter().map(|(c, n)| serde_json::json!({"class": c, "count": n})).collect::<Vec<_>>(),
            "prefetch_enabled": prefetch.enabled,
            "batch_size": prefetch.batch_size,
            "cache_capacity": ctx.config.cache.capacity,
            "descriptors": descriptors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Store");
    println!("  Database: {}", ctx.database_path().display());
    println!("  Sequence: {}", store.sequence());
    println!("  Items:    {}", item_count);
    for (class, count) in &classes {
        println!("    {:<24} {}", class, count);
    }

    println!("\nPrefetch");
    println!("  Enabled:    {}", prefetch.enabled);
    println!("  Batch size: {}", prefetch.batch_size);
    match ctx.config.cache.capacity {
        Some(capacity) => println!("  Cache:      LRU, {} descriptions", capacity),
        None => println!("  Cache:      unbounded"),
    }
    if prefetch.descriptors.is_empty() {
        println!("  No descriptors configured");
    }
    for d in &prefetch.descriptors {
        let role = if d.root { "root" } else { "child" };
        print!("  {} ({}, {}, {} field(s))", d.name, d.owner_class, role, d.fields.len());
        if !d.children.is_empty() {
            print!(" -> {}", d.children.join(", "));
        }
        println!();
    }
    Ok(())
}
