//! ItemPath Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.itempath/config.toml`
//! - Local config: `.itempath/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.
//!
//! Prefetch descriptors are declared here as plain data ([`DescriptorSpec`]);
//! the core crate turns them into an immutable descriptor registry.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default number of rows fetched per round trip by prefetch queries.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default number of cache misses between diagnostic log lines.
pub const DEFAULT_MISS_LOG_INTERVAL: u64 = 1_000;

/// Root configuration for ItemPath.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ItempathConfig {
    /// Item store configuration
    pub store: StoreConfig,

    /// Descriptive cache configuration
    pub cache: CacheConfig,

    /// Prefetch engine configuration
    pub prefetch: PrefetchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage configuration for the SQLite item store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for ItemPath data (default: `.itempath`)
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".itempath"),
            database: "items.db".to_string(),
        }
    }
}

/// Descriptive cache configuration.
///
/// The cache is unbounded unless `capacity` is set, in which case
/// least-recently-used descriptions are evicted beyond that many entries.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached descriptions (None = unbounded)
    pub capacity: Option<usize>,
}

/// Prefetch engine configuration.
///
/// # Example TOML
///
/// ```toml
/// [prefetch]
/// batch_size = 10000
///
/// [[prefetch.descriptors]]
/// name = "employee-department"
/// owner_class = "Employee"
/// children = ["department-company"]
/// fields = [
///     { field = "className", value = "Department" },
///     { field = "name", from = "departmentName" },
/// ]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Enable prefetching (false = pure pass-through)
    pub enabled: bool,

    /// Rows fetched per round trip by batch queries
    pub batch_size: usize,

    /// Log a cache diagnostic every this many misses
    pub miss_log_interval: u64,

    /// Descriptor definitions
    pub descriptors: Vec<DescriptorSpec>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            miss_log_interval: DEFAULT_MISS_LOG_INTERVAL,
            descriptors: Vec::new(),
        }
    }
}

/// A prefetch descriptor as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorSpec {
    /// Unique descriptor name (used to reference children)
    pub name: String,

    /// Class of the items this descriptor is applied to
    pub owner_class: String,

    /// Register for `owner_class` in root batches (false = only reachable as a child)
    #[serde(default = "default_true")]
    pub root: bool,

    /// Field templates identifying the target items
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Names of descriptors applied to the fetched targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

/// One field template of a descriptor.
///
/// Exactly one of `value` (static literal) or `from` (derived from a field of
/// the item being matched) must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field of the target item to match
    pub field: String,

    /// Match a reference rather than an attribute
    #[serde(default)]
    pub reference: bool,

    /// Static literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Field of the source item supplying the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// The source field is a reference
    #[serde(default)]
    pub from_reference: bool,
}

fn default_true() -> bool {
    true
}

impl PrefetchConfig {
    /// Validate descriptor definitions.
    ///
    /// Checks name uniqueness, field template shape, child references and
    /// that children never loop back to an ancestor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "prefetch.batch_size",
                "must be greater than zero",
            ));
        }

        let mut names = HashSet::new();
        for spec in &self.descriptors {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate descriptor name '{}'",
                    spec.name
                )));
            }
            spec.validate()?;
        }

        let by_name: HashMap<&str, &DescriptorSpec> = self
            .descriptors
            .iter()
            .map(|s| (s.name.as_str(), s))
            .collect();

        for spec in &self.descriptors {
            for child in &spec.children {
                if !by_name.contains_key(child.as_str()) {
                    return Err(ConfigError::unknown_descriptor(&spec.name, child));
                }
            }
        }

        let mut finished = HashSet::new();
        for spec in &self.descriptors {
            let mut path = Vec::new();
            check_cycles(spec, &by_name, &mut path, &mut finished)?;
        }

        Ok(())
    }

    /// Look up a descriptor definition by name.
    pub fn descriptor(&self, name: &str) -> Option<&DescriptorSpec> {
        self.descriptors.iter().find(|d| d.name == name)
    }
}

/// Depth-first walk over child names, failing on a back edge.
fn check_cycles<'a>(
    spec: &'a DescriptorSpec,
    by_name: &HashMap<&str, &'a DescriptorSpec>,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Result<(), ConfigError> {
    if finished.contains(spec.name.as_str()) {
        return Ok(());
    }
    if let Some(pos) = path.iter().position(|n| *n == spec.name) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(spec.name.clone());
        return Err(ConfigError::DescriptorCycle { path: cycle });
    }

    path.push(spec.name.as_str());
    for child in &spec.children {
        if let Some(&child_spec) = by_name.get(child.as_str()) {
            check_cycles(child_spec, by_name, path, finished)?;
        }
    }
    path.pop();
    finished.insert(spec.name.as_str());
    Ok(())
}

impl DescriptorSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        let key = format!("prefetch.descriptors.{}", self.name);
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "descriptor name must not be empty".to_string(),
            ));
        }
        if self.owner_class.is_empty() {
            return Err(ConfigError::invalid_value(key, "owner_class is required"));
        }
        if self.fields.is_empty() {
            return Err(ConfigError::invalid_value(
                key,
                "at least one field template is required",
            ));
        }

        let mut targets = HashSet::new();
        for field in &self.fields {
            match (&field.value, &field.from) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::invalid_value(
                        format!("{}.{}", key, field.field),
                        "set either 'value' or 'from', not both",
                    ))
                }
                (None, None) => {
                    return Err(ConfigError::invalid_value(
                        format!("{}.{}", key, field.field),
                        "one of 'value' or 'from' is required",
                    ))
                }
                _ => {}
            }
            if !targets.insert((field.field.as_str(), field.reference)) {
                return Err(ConfigError::invalid_value(
                    format!("{}.{}", key, field.field),
                    "field is matched more than once",
                ));
            }
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override ItemPath data directory
    pub data_dir: Option<PathBuf>,

    /// Override cache capacity
    pub cache_capacity: Option<usize>,

    /// Override prefetch enablement
    pub prefetch_enabled: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl ItempathConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.store.data_dir = dir.clone();
        }

        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }

        if let Some(enabled) = overrides.prefetch_enabled {
            self.prefetch.enabled = enabled;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == Some(0) {
            return Err(ConfigError::invalid_value(
                "cache.capacity",
                "must be greater than zero",
            ));
        }
        self.prefetch.validate()
    }

    /// Get the effective data directory for a workspace.
    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.store.data_dir.is_absolute() {
            self.store.data_dir.clone()
        } else {
            workspace_root.join(&self.store.data_dir)
        }
    }

    /// Get the item database path for a workspace.
    pub fn database_path(&self, workspace_root: &Path) -> PathBuf {
        self.data_dir(workspace_root).join(&self.store.database)
    }
}
