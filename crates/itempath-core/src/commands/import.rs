//! Import command - Load items from JSON Lines

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use itempath_core::Item;
use tracing::info;

use super::CommandContext;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON Lines file with one item per line
    file: PathBuf,
}

/// Execute the import command
pub fn execute(args: ImportArgs, ctx: &CommandContext) -> Result<()> {
    let items = read_items(&args.file)?;
    let store = ctx.create_store()?;
    let sequence = store
        .insert_items(&items)
        .context("Failed to write items")?;

    info!(items = items.len(), file = %args.file.display(), "Import complete");
    if !ctx.quiet {
        println!(
            "Imported {} items into {} (sequence {})",
            items.len(),
            ctx.database_path().display(),
            sequence
        );
    }
    Ok(())
}

/// Parse every non-blank line of `path` as an item.
fn read_items(path: &Path) -> Result<Vec<Item>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut items = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let item: Item = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid item", path.display(), idx + 1))?;
        items.push(item);
    }
    Ok(items)
}
