//! Lookup command - Fetch the items matching one description

use anyhow::{Context, Result};
use clap::Args;
use itempath_core::{Description, FieldMatch, Item};

use super::{describe_item, CommandContext};

/// Arguments for the lookup command
#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Attribute criterion `name=value` (`identifier` and `className` match the item itself)
    #[arg(long = "attr", value_parser = parse_pair)]
    attributes: Vec<(String, String)>,

    /// Reference criterion `name=identifier`
    #[arg(long = "ref", value_parser = parse_pair)]
    references: Vec<(String, String)>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Parse `name=value`
fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

/// Execute the lookup command
pub fn execute(args: LookupArgs, ctx: &CommandContext) -> Result<()> {
    let description: Description = args
        .attributes
        .iter()
        .map(|(name, value)| FieldMatch::attribute(name, value))
        .chain(
            args.references
                .iter()
                .map(|(name, id)| FieldMatch::reference(name, id)),
        )
        .collect();
    if description.is_empty() {
        anyhow::bail!("Give at least one --attr or --ref criterion");
    }

    let store = ctx.path_following_store()?;
    let items = store
        .get_items_by_description(&description)
        .with_context(|| format!("Lookup of {} failed", description))?;

    if args.json {
        let items: Vec<&Item> = items.iter().map(|item| item.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("{} item(s) match {}", items.len(), description);
    for item in items.iter() {
        println!("  {}", describe_item(item));
    }
    Ok(())
}
