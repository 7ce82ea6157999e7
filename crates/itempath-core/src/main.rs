//! ItemPath CLI - Load items and exercise descriptor-driven prefetching
//!
//! # Usage
//!
//! ```bash
//! # Create .itempath/config.toml and an empty store
//! itempath init
//!
//! # Load items from JSON Lines into the workspace store
//! itempath import items.jsonl
//!
//! # Fetch every Employee and follow the configured descriptors
//! itempath fetch Employee
//!
//! # Look up items by description
//! itempath lookup --attr className=Department --attr name=Finance
//!
//! # Show store and descriptor statistics
//! itempath stats
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use itempath_config::{ConfigOverrides, LogFormat};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// ItemPath - Descriptor-driven prefetching over an item store
#[derive(Parser, Debug)]
#[command(name = "itempath")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace directory holding `.itempath/`
    #[arg(long, short = 'w', global = true, env = "ITEMPATH_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to a configuration file (bypasses global/local merging)
    #[arg(long, short = 'c', global = true, env = "ITEMPATH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Bound the descriptive cache to this many descriptions
    #[arg(long, global = true)]
    cache_capacity: Option<usize>,

    /// Disable prefetching (pass-through mode)
    #[arg(long, global = true)]
    no_prefetch: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cache_capacity: self.cache_capacity,
            prefetch_enabled: self.no_prefetch.then_some(false),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the workspace configuration and item store
    Init(commands::init::InitArgs),

    /// Import items from a JSON Lines file
    Import(commands::import::ImportArgs),

    /// Fetch all items of a class and prefetch related items
    Fetch(commands::fetch::FetchArgs),

    /// Look up items matching one description
    Lookup(commands::lookup::LookupArgs),

    /// Show store and descriptor statistics
    Stats(commands::stats::StatsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::CommandContext::load(&cli.global)?;

    // Flags win over the configured level
    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::from_str(&ctx.config.logging.level)
            .with_context(|| format!("Invalid log level '{}'", ctx.config.logging.level))?
    };

    match ctx.config.logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx),
        Commands::Import(args) => commands::import::execute(args, &ctx),
        Commands::Fetch(args) => commands::fetch::execute(args, &ctx),
        Commands::Lookup(args) => commands::lookup::execute(args, &ctx),
        Commands::Stats(args) => commands::stats::execute(args, &ctx),
    }
}
