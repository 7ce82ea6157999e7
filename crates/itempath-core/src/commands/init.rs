//! Init command - Create a workspace configuration and an empty item store

use anyhow::{Context, Result};
use clap::Args;
use itempath_config::{ConfigLoader, ItempathConfig};
use itempath_core::ObjectStore;
use tracing::info;

use super::CommandContext;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing local configuration with the defaults
    #[arg(long, short = 'f')]
    force: bool,
}

/// Execute the init command
pub fn execute(args: InitArgs, ctx: &CommandContext) -> Result<()> {
    let loader = ConfigLoader::new();
    let config_path = loader.local_config_path(&ctx.workspace);

    if config_path.exists() {
        if !args.force {
            anyhow::bail!(
                "Workspace already initialized at {}. Use --force to reinitialize.",
                config_path.display()
            );
        }
        loader
            .save_local(&ctx.workspace, &ItempathConfig::default())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    } else {
        loader
            .init_local(&ctx.workspace)
            .context("Failed to create local configuration")?;
    }

    let store = ctx.create_store()?;
    info!(
        config = %config_path.display(),
        sequence = %store.sequence(),
        "Workspace initialized"
    );

    if !ctx.quiet {
        println!("Initialized ItemPath workspace in {}", ctx.workspace.display());
        println!("  Config: {}", config_path.display());
        println!("  Store:  {}", ctx.database_path().display());
    }
    Ok(())
}
