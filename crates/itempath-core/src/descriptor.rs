//! Prefetch descriptors.
//!
//! A descriptor says how to identify the items related to a source item:
//! an ordered list of field templates, each either a static literal or a
//! value derived from one field of the source item. Resolving the templates
//! against an item yields a [`Description`]. The same templates applied in
//! reverse to a *fetched* item reproduce the description it satisfies, which
//! is what lets one batched query be split back into per-request groups.
//!
//! Descriptors are immutable once built and are shared by `Arc`.

use crate::description::{Description, FieldMatch};
use crate::item::Item;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// An expected field could not be read from an item.
///
/// Descriptors are hints; this is recoverable and the pair is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("descriptor '{descriptor}' cannot read {kind} '{field}' from {class_name}[{identifier}]")]
pub struct ResolveError {
    pub descriptor: String,
    pub field: String,
    pub kind: &'static str,
    pub class_name: String,
    pub identifier: String,
}

/// Invalid descriptor definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor '{descriptor}' has no field templates")]
    NoTemplates { descriptor: String },

    #[error("descriptor '{descriptor}' matches {kind} '{field}' more than once")]
    DuplicateField {
        descriptor: String,
        field: String,
        kind: &'static str,
    },
}

fn kind(is_reference: bool) -> &'static str {
    if is_reference {
        "reference"
    } else {
        "attribute"
    }
}

/// Where a template's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// The same literal for every source item
    Static(String),
    /// Read from a field of the source item
    Derived {
        source_field: String,
        source_is_reference: bool,
    },
}

/// One field of the target items' description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTemplate {
    pub field_name: String,
    pub is_reference: bool,
    pub source: FieldSource,
}

impl FieldTemplate {
    /// Target field must equal `value` for every source item.
    pub fn fixed(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            is_reference: false,
            source: FieldSource::Static(value.into()),
        }
    }

    /// Target attribute `field_name` must equal the source item's attribute `source_field`.
    pub fn from_attribute(field_name: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            is_reference: false,
            source: FieldSource::Derived {
                source_field: source_field.into(),
                source_is_reference: false,
            },
        }
    }

    /// Target attribute `field_name` must equal the id the source item's reference points at.
    ///
    /// `FieldTemplate::from_reference("identifier", "department")` fetches the referenced item.
    pub fn from_reference(field_name: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            is_reference: false,
            source: FieldSource::Derived {
                source_field: source_field.into(),
                source_is_reference: true,
            },
        }
    }

    /// Match a reference on the target instead of an attribute.
    pub fn on_reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    pub fn is_static(&self) -> bool {
        matches!(self.source, FieldSource::Static(_))
    }

    /// Forward rule: the criterion this template imposes for `source`.
    pub fn resolve(&self, descriptor: &str, source: &Item) -> Result<FieldMatch, ResolveError> {
        let value = match &self.source {
            FieldSource::Static(value) => value.as_str(),
            FieldSource::Derived {
                source_field,
                source_is_reference,
            } => source
                .field(source_field, *source_is_reference)
                .ok_or_else(|| ResolveError {
                    descriptor: descriptor.to_string(),
                    field: source_field.clone(),
                    kind: kind(*source_is_reference),
                    class_name: source.class_name.clone(),
                    identifier: source.identifier.clone(),
                })?,
        };
        Ok(FieldMatch::new(&self.field_name, value, self.is_reference))
    }

    /// Reverse rule: every criterion a fetched `target` satisfies for this template.
    ///
    /// A derived template yields one match per value of a repeated field.
    pub fn resolve_from_target(
        &self,
        descriptor: &str,
        target: &Item,
    ) -> Result<Vec<FieldMatch>, ResolveError> {
        match &self.source {
            FieldSource::Static(value) => Ok(vec![FieldMatch::new(
                &self.field_name,
                value,
                self.is_reference,
            )]),
            FieldSource::Derived { .. } => {
                let values = target.field_values(&self.field_name, self.is_reference);
                if values.is_empty() {
                    return Err(ResolveError {
                        descriptor: descriptor.to_string(),
                        field: self.field_name.clone(),
                        kind: kind(self.is_reference),
                        class_name: target.class_name.clone(),
                        identifier: target.identifier.clone(),
                    });
                }
                Ok(values
                    .into_iter()
                    .map(|value| FieldMatch::new(&self.field_name, value, self.is_reference))
                    .collect())
            }
        }
    }
}

/// A reusable rule describing which related items to prefetch for items of
/// `owner_class`, and which descriptors to chain onto the fetched items.
#[derive(Debug)]
pub struct PrefetchDescriptor {
    name: String,
    owner_class: String,
    templates: Vec<FieldTemplate>,
    children: Vec<Arc<PrefetchDescriptor>>,
}

impl PrefetchDescriptor {
    pub fn new(
        name: impl Into<String>,
        owner_class: impl Into<String>,
        templates: Vec<FieldTemplate>,
        children: Vec<Arc<PrefetchDescriptor>>,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if templates.is_empty() {
            return Err(DescriptorError::NoTemplates { descriptor: name });
        }

        let mut seen = HashSet::new();
        for template in &templates {
            if !seen.insert((template.field_name.as_str(), template.is_reference)) {
                return Err(DescriptorError::DuplicateField {
                    descriptor: name,
                    field: template.field_name.clone(),
                    kind: kind(template.is_reference),
                });
            }
        }

        Ok(Self {
            name,
            owner_class: owner_class.into(),
            templates,
            children,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_class(&self) -> &str {
        &self.owner_class
    }

    pub fn templates(&self) -> &[FieldTemplate] {
        &self.templates
    }

    pub fn children(&self) -> &[Arc<PrefetchDescriptor>] {
        &self.children
    }

    /// Description of the items `source` needs, per this descriptor.
    pub fn description_for(&self, source: &Item) -> Result<Description, ResolveError> {
        self.templates
            .iter()
            .map(|t| t.resolve(&self.name, source))
            .collect()
    }

    /// Descriptions a fetched item satisfies; the mirror of [`Self::description_for`].
    ///
    /// An item with a single value per field satisfies exactly one. Repeated
    /// fields multiply out, so the item can answer several descriptions.
    pub fn descriptions_from_target(
        &self,
        target: &Item,
    ) -> Result<Vec<Description>, ResolveError> {
        let mut descriptions = vec![Description::new()];
        for template in &self.templates {
            let matches = template.resolve_from_target(&self.name, target)?;
            descriptions = descriptions
                .into_iter()
                .flat_map(|partial| {
                    matches
                        .iter()
                        .map(move |m| partial.clone().with(m.clone()))
                })
                .collect();
        }
        Ok(descriptions)
    }

    /// True if `field` is one of this descriptor's static literals, i.e. shared
    /// by every description it produces.
    pub fn is_static(&self, field: &FieldMatch) -> bool {
        self.templates.iter().any(|t| {
            t.field_name == field.field_name
                && t.is_reference == field.is_reference
                && matches!(&t.source, FieldSource::Static(v) if *v == field.value)
        })
    }
}

impl std::fmt::Display for PrefetchDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.owner_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department_by_name() -> PrefetchDescriptor {
        PrefetchDescriptor::new(
            "employee-department",
            "Employee",
            vec![
                FieldTemplate::fixed("className", "Department"),
                FieldTemplate::from_attribute("name", "departmentName"),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_resolution() {
        let employee = Item::new("e1", "Employee").with_attribute("departmentName", "Finance");
        let description = department_by_name().description_for(&employee).unwrap();

        let expected = Description::new()
            .with(FieldMatch::attribute("className", "Department"))
            .with(FieldMatch::attribute("name", "Finance"));
        assert_eq!(description, expected);
    }

    #[test]
    fn test_reverse_mirrors_forward() {
        let descriptor = department_by_name();
        let employee = Item::new("e1", "Employee").with_attribute("departmentName", "Sales");
        let department = Item::new("d2", "Department").with_attribute("name", "Sales");

        assert_eq!(
            vec![descriptor.description_for(&employee).unwrap()],
            descriptor.descriptions_from_target(&department).unwrap()
        );
    }

    #[test]
    fn test_reference_to_identifier() {
        let descriptor = PrefetchDescriptor::new(
            "employee-department",
            "Employee",
            vec![FieldTemplate::from_reference("identifier", "department")],
            Vec::new(),
        )
        .unwrap();
        let employee = Item::new("e1", "Employee").with_reference("department", "d1");
        let department = Item::new("d1", "Department");

        let forward = descriptor.description_for(&employee).unwrap();
        assert_eq!(
            forward,
            Description::new().with(FieldMatch::attribute("identifier", "d1"))
        );
        assert_eq!(vec![forward], descriptor.descriptions_from_target(&department).unwrap());
    }

    #[test]
    fn test_target_reference_template() {
        // Fetch every employee whose `department` reference points at this department.
        let descriptor = PrefetchDescriptor::new(
            "department-employees",
            "Department",
            vec![FieldTemplate::from_attribute("department", "identifier").on_reference()],
            Vec::new(),
        )
        .unwrap();
        let department = Item::new("d1", "Department");
        let employee = Item::new("e1", "Employee").with_reference("department", "d1");

        let forward = descriptor.description_for(&department).unwrap();
        assert_eq!(
            forward,
            Description::new().with(FieldMatch::reference("department", "d1"))
        );
        assert_eq!(vec![forward], descriptor.descriptions_from_target(&employee).unwrap());
    }

    #[test]
    fn test_repeated_target_field_answers_each_value() {
        let descriptor = department_by_name();
        let department = Item::new("d1", "Department")
            .with_attribute("name", "Finance")
            .with_attribute("name", "Accounts");
        let by_name = |name: &str| {
            Description::new()
                .with(FieldMatch::attribute("className", "Department"))
                .with(FieldMatch::attribute("name", name))
        };

        assert_eq!(
            descriptor.descriptions_from_target(&department).unwrap(),
            vec![by_name("Finance"), by_name("Accounts")]
        );
    }

    #[test]
    fn test_missing_field() {
        let employee = Item::new("e9", "Employee");
        let err = department_by_name().description_for(&employee).unwrap_err();
        assert_eq!(err.field, "departmentName");
        assert_eq!(err.identifier, "e9");
        assert!(err.to_string().contains("employee-department"));
    }

    #[test]
    fn test_is_static() {
        let descriptor = department_by_name();
        assert!(descriptor.is_static(&FieldMatch::attribute("className", "Department")));
        assert!(!descriptor.is_static(&FieldMatch::attribute("className", "Company")));
        assert!(!descriptor.is_static(&FieldMatch::attribute("name", "Finance")));
    }

    #[test]
    fn test_rejects_duplicate_templates() {
        let err = PrefetchDescriptor::new(
            "dup",
            "Employee",
            vec![
                FieldTemplate::fixed("name", "a"),
                FieldTemplate::from_attribute("name", "b"),
            ],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateField { .. }));

        let err = PrefetchDescriptor::new("empty", "Employee", Vec::new(), Vec::new()).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::NoTemplates {
                descriptor: "empty".to_string()
            }
        );
    }
}
