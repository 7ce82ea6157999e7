//! CLI command implementations

pub mod fetch;
pub mod import;
pub mod init;
pub mod lookup;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itempath_config::{ConfigLoader, ItempathConfig};
use itempath_core::{Item, PathFollowingStore, SqliteItemStore};

use crate::GlobalOptions;

/// Resolved workspace and merged configuration shared by every command
pub struct CommandContext {
    pub workspace: PathBuf,
    pub config: ItempathConfig,
    pub quiet: bool,
}

impl CommandContext {
    pub fn load(global: &GlobalOptions) -> Result<Self> {
        let workspace = resolve_workspace(global)?;
        let config = load_config(global, &workspace)?;
        Ok(Self {
            workspace,
            config,
            quiet: global.quiet,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.database_path(&self.workspace)
    }

    /// Open the workspace store, creating it if needed.
    pub fn create_store(&self) -> Result<SqliteItemStore> {
        let path = self.database_path();
        SqliteItemStore::open(&path)
            .with_context(|| format!("Failed to open item store at {}", path.display()))
    }

    /// Open an existing workspace store.
    pub fn open_store(&self) -> Result<SqliteItemStore> {
        let path = self.database_path();
        if !path.exists() {
            anyhow::bail!(
                "No item store at {} (run `itempath import` first)",
                path.display()
            );
        }
        self.create_store()
    }

    /// Open the store wrapped in the configured prefetch engine.
    pub fn path_following_store(&self) -> Result<PathFollowingStore<SqliteItemStore>> {
        let store = self.open_store()?;
        PathFollowingStore::from_config(store, &self.config)
            .context("Invalid prefetch configuration")
    }
}

/// Resolve the workspace path from options or current directory.
fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    if let Some(ref ws) = global.workspace {
        if !ws.is_dir() {
            anyhow::bail!("Workspace '{}' is not a directory", ws.display());
        }
        return ws
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace {}", ws.display()));
    }

    std::env::current_dir().context("Failed to get current directory")
}

/// Load configuration with optional config file override.
fn load_config(global: &GlobalOptions, workspace: &Path) -> Result<ItempathConfig> {
    let overrides = global.to_config_overrides();

    if let Some(ref config_path) = global.config {
        return ConfigLoader::load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    ConfigLoader::new()
        .load(workspace, Some(&overrides))
        .context("Failed to load configuration")
}

/// One-line summary of an item for text output
pub fn describe_item(item: &Item) -> String {
    let mut fields: Vec<String> = item
        .attributes
        .iter()
        .map(|a| format!("{}={}", a.name, a.value))
        .collect();
    fields.extend(
        item.references
            .iter()
            .map(|r| format!("{}->{}", r.name, r.ref_id)),
    );
    if fields.is_empty() {
        item.to_string()
    } else {
        format!("{} {}", item, fields.join(" "))
    }
}
