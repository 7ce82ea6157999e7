//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.itempath/config.toml`
//! 2. Local config: `.itempath/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{
    CacheConfig, ConfigOverrides, DescriptorSpec, ItempathConfig, LoggingConfig, PrefetchConfig,
    StoreConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".itempath";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".itempath";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.itempath`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<ItempathConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.itempath`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ItempathConfig, ConfigError> {
        let mut config = ItempathConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a single explicit configuration file, bypassing inheritance.
    pub fn load_file(
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ItempathConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = load_config_file(path)?;
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<ItempathConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<ItempathConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &ItempathConfig,
    ) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.itempath/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = workspace_root.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir)
                .map_err(|e| ConfigError::create_dir(&local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            save_config_file(&config_path, &ItempathConfig::default())?;
        }

        Ok(config_path)
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<ItempathConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &ItempathConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: ItempathConfig, overlay: ItempathConfig) -> ItempathConfig {
    ItempathConfig {
        store: merge_store(base.store, overlay.store),
        cache: merge_cache(base.cache, overlay.cache),
        prefetch: merge_prefetch(base.prefetch, overlay.prefetch),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_store(base: StoreConfig, overlay: StoreConfig) -> StoreConfig {
    let defaults = StoreConfig::default();
    StoreConfig {
        data_dir: if overlay.data_dir != defaults.data_dir {
            overlay.data_dir
        } else {
            base.data_dir
        },
        database: if overlay.database != defaults.database {
            overlay.database
        } else {
            base.database
        },
    }
}

fn merge_cache(base: CacheConfig, overlay: CacheConfig) -> CacheConfig {
    CacheConfig {
        capacity: overlay.capacity.or(base.capacity),
    }
}

/// Merge prefetch config.
///
/// Descriptors with the same name are replaced by the overlay; new names are appended.
fn merge_prefetch(base: PrefetchConfig, overlay: PrefetchConfig) -> PrefetchConfig {
    let mut descriptors: Vec<DescriptorSpec> = base.descriptors;
    for spec in overlay.descriptors {
        match descriptors.iter_mut().find(|d| d.name == spec.name) {
            Some(existing) => *existing = spec,
            None => descriptors.push(spec),
        }
    }

    PrefetchConfig {
        enabled: overlay.enabled && base.enabled,
        batch_size: if overlay.batch_size != crate::DEFAULT_BATCH_SIZE {
            overlay.batch_size
        } else {
            base.batch_size
        },
        miss_log_interval: if overlay.miss_log_interval != crate::DEFAULT_MISS_LOG_INTERVAL {
            overlay.miss_log_interval
        } else {
            base.miss_log_interval
        },
        descriptors,
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: overlay.format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_defaults_without_files() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(global.path());

        let config = loader.load(workspace.path(), None).unwrap();
        assert_eq!(config.store.database, "items.db");
        assert!(config.prefetch.descriptors.is_empty());
    }

    #[test]
    fn test_local_overrides_global() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        write_config(
            global.path(),
            r#"
            [cache]
            capacity = 100

            [prefetch]
            batch_size = 200

            [[prefetch.descriptors]]
            name = "shared"
            owner_class = "Gene"
            fields = [{ field = "identifier", from = "organism", from_reference = true }]
            "#,
        );
        write_config(
            &workspace.path().join(LOCAL_CONFIG_DIR),
            r#"
            [logging]
            level = "debug"

            [[prefetch.descriptors]]
            name = "shared"
            owner_class = "Protein"
            fields = [{ field = "identifier", from = "gene", from_reference = true }]

            [[prefetch.descriptors]]
            name = "local-only"
            owner_class = "Gene"
            fields = [{ field = "className", value = "Organism" }]
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(workspace.path(), None).unwrap();

        assert_eq!(config.cache.capacity, Some(100));
        assert_eq!(config.prefetch.batch_size, 200);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.prefetch.descriptors.len(), 2);
        assert_eq!(
            config.prefetch.descriptor("shared").unwrap().owner_class,
            "Protein"
        );
        assert!(config.prefetch.descriptor("local-only").is_some());
    }

    #[test]
    fn test_overrides_win() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(global.path());

        let overrides = ConfigOverrides {
            prefetch_enabled: Some(false),
            ..Default::default()
        };
        let config = loader.load(workspace.path(), Some(&overrides)).unwrap();
        assert!(!config.prefetch.enabled);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let workspace = TempDir::new().unwrap();
        let path = workspace.path().join("broken.toml");
        std::fs::write(&path, "[prefetch\nbatch_size = ").unwrap();

        let err = ConfigLoader::load_file(&path, None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_load_file_validates() {
        let workspace = TempDir::new().unwrap();
        let path = workspace.path().join("cycle.toml");
        std::fs::write(
            &path,
            r#"
            [[prefetch.descriptors]]
            name = "a"
            owner_class = "A"
            children = ["a"]
            fields = [{ field = "identifier", from = "next", from_reference = true }]
            "#,
        )
        .unwrap();

        let err = ConfigLoader::load_file(&path, None).unwrap_err();
        assert!(matches!(err, ConfigError::DescriptorCycle { .. }));
    }

    #[test]
    fn test_init_and_save_local_roundtrip() {
        let workspace = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(workspace.path().join("global"));

        let path = loader.init_local(workspace.path()).unwrap();
        assert!(path.exists());

        let mut config = ItempathConfig::default();
        config.cache.capacity = Some(42);
        loader.save_local(workspace.path(), &config).unwrap();

        let loaded = loader.load_local(workspace.path()).unwrap().unwrap();
        assert_eq!(loaded.cache.capacity, Some(42));
    }
}
