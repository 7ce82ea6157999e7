//! Descriptor Registry
//!
//! Immutable mapping from class name to the descriptors applied to root
//! batch items of that class. Built once and shared by `Arc`; an empty
//! registry turns the path-following store into a pass-through.

use crate::descriptor::{DescriptorError, FieldSource, FieldTemplate, PrefetchDescriptor};
use itempath_config::{ConfigError, DescriptorSpec, PrefetchConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Class name → descriptors applied to items of that class.
#[derive(Debug, Default, Clone)]
pub struct DescriptorRegistry {
    by_class: HashMap<String, Vec<Arc<PrefetchDescriptor>>>,
}

impl DescriptorRegistry {
    pub fn builder() -> DescriptorRegistryBuilder {
        DescriptorRegistryBuilder::default()
    }

    /// Descriptors registered for `class_name` (empty if none).
    pub fn descriptors_for(&self, class_name: &str) -> &[Arc<PrefetchDescriptor>] {
        self.by_class
            .get(class_name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.values().all(|v| v.is_empty())
    }

    /// Number of root registrations across all classes.
    pub fn len(&self) -> usize {
        self.by_class.values().map(|v| v.len()).sum()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.by_class.keys().map(|k| k.as_str())
    }

    /// Build from validated configuration.
    ///
    /// Only specs with `root = true` are registered; the rest are reachable as
    /// children. Children are shared: a descriptor named by several parents is built once.
    pub fn from_config(config: &PrefetchConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let specs: HashMap<&str, &DescriptorSpec> = config
            .descriptors
            .iter()
            .map(|s| (s.name.as_str(), s))
            .collect();
        let mut built: HashMap<String, Arc<PrefetchDescriptor>> = HashMap::new();

        let mut builder = Self::builder();
        for spec in config.descriptors.iter().filter(|s| s.root) {
            let descriptor = build_descriptor(spec, &specs, &mut built)?;
            builder = builder.register(descriptor);
        }
        Ok(builder.build())
    }
}

/// Builder collecting root descriptors under their owner class.
#[derive(Debug, Default)]
pub struct DescriptorRegistryBuilder {
    by_class: HashMap<String, Vec<Arc<PrefetchDescriptor>>>,
}

impl DescriptorRegistryBuilder {
    /// Register `descriptor` for its owner class.
    pub fn register(mut self, descriptor: Arc<PrefetchDescriptor>) -> Self {
        self.by_class
            .entry(descriptor.owner_class().to_string())
            .or_default()
            .push(descriptor);
        self
    }

    pub fn build(self) -> DescriptorRegistry {
        DescriptorRegistry {
            by_class: self.by_class,
        }
    }
}

/// Recursively build a descriptor and its children. Config validation has
/// already ruled out unknown names and cycles.
fn build_descriptor(
    spec: &DescriptorSpec,
    specs: &HashMap<&str, &DescriptorSpec>,
    built: &mut HashMap<String, Arc<PrefetchDescriptor>>,
) -> Result<Arc<PrefetchDescriptor>, ConfigError> {
    if let Some(existing) = built.get(&spec.name) {
        return Ok(Arc::clone(existing));
    }

    let mut children = Vec::with_capacity(spec.children.len());
    for child_name in &spec.children {
        let child = specs
            .get(child_name.as_str())
            .ok_or_else(|| ConfigError::unknown_descriptor(&spec.name, child_name))?;
        children.push(build_descriptor(child, specs, built)?);
    }

    let templates = spec
        .fields
        .iter()
        .map(|f| FieldTemplate {
            field_name: f.field.clone(),
            is_reference: f.reference,
            source: match (&f.value, &f.from) {
                (Some(value), _) => FieldSource::Static(value.clone()),
                (None, from) => FieldSource::Derived {
                    source_field: from.clone().unwrap_or_default(),
                    source_is_reference: f.from_reference,
                },
            },
        })
        .collect();

    let descriptor = PrefetchDescriptor::new(&spec.name, &spec.owner_class, templates, children)
        .map_err(|e: DescriptorError| ConfigError::ValidationError(e.to_string()))?;
    let descriptor = Arc::new(descriptor);
    built.insert(spec.name.clone(), Arc::clone(&descriptor));
    Ok(descriptor)
}
