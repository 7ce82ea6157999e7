//! Item Graph Model
//!
//! Read-only view of a fetched record: a class name, an identifier, and
//! named attributes and references. Items are produced by the store and
//! never modified by the prefetch engine.

use serde::{Deserialize, Serialize};

/// Name of the intrinsic identifier field.
pub const IDENTIFIER_FIELD: &str = "identifier";

/// Name of the intrinsic class name field.
pub const CLASS_NAME_FIELD: &str = "className";

/// Returns true if `name` addresses an intrinsic column of the item itself.
pub fn is_intrinsic_field(name: &str) -> bool {
    name == IDENTIFIER_FIELD || name == CLASS_NAME_FIELD
}

/// A named literal value on an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A named pointer from an item to another item's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub name: String,
    pub ref_id: String,
}

/// A generic fetched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Store-wide unique identifier
    pub identifier: String,
    /// Class of the record (e.g. "Employee")
    pub class_name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Item {
    pub fn new(identifier: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            class_name: class_name.into(),
            attributes: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Builder-style attribute addition.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Builder-style reference addition.
    pub fn with_reference(mut self, name: impl Into<String>, ref_id: impl Into<String>) -> Self {
        self.references.push(Reference {
            name: name.into(),
            ref_id: ref_id.into(),
        });
        self
    }

    /// Value of the first attribute called `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Target identifier of the first reference called `name`.
    pub fn reference(&self, name: &str) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.ref_id.as_str())
    }

    /// Read a field the way descriptions address it.
    ///
    /// Attribute-style access to `identifier`/`className` reads the intrinsic
    /// columns; everything else goes through the attribute or reference lists.
    pub fn field(&self, name: &str, is_reference: bool) -> Option<&str> {
        if is_reference {
            return self.reference(name);
        }
        match name {
            IDENTIFIER_FIELD => Some(self.identifier.as_str()),
            CLASS_NAME_FIELD => Some(self.class_name.as_str()),
            _ => self.attribute(name),
        }
    }

    /// Every value of a field, in insertion order.
    ///
    /// Attributes and references may repeat a name; intrinsic fields have
    /// exactly one value.
    pub fn field_values(&self, name: &str, is_reference: bool) -> Vec<&str> {
        if is_reference {
            return self
                .references
                .iter()
                .filter(|r| r.name == name)
                .map(|r| r.ref_id.as_str())
                .collect();
        }
        match name {
            IDENTIFIER_FIELD => vec![self.identifier.as_str()],
            CLASS_NAME_FIELD => vec![self.class_name.as_str()],
            _ => self
                .attributes
                .iter()
                .filter(|a| a.name == name)
                .map(|a| a.value.as_str())
                .collect(),
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.class_name, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> Item {
        Item::new("e1", "Employee")
            .with_attribute("name", "Ada")
            .with_attribute("departmentName", "Finance")
            .with_reference("department", "d1")
    }

    #[test]
    fn test_intrinsic_fields() {
        let item = employee();
        assert_eq!(item.field("identifier", false), Some("e1"));
        assert_eq!(item.field("className", false), Some("Employee"));
    }

    #[test]
    fn test_attribute_and_reference_fields() {
        let item = employee();
        assert_eq!(item.field("departmentName", false), Some("Finance"));
        assert_eq!(item.field("department", true), Some("d1"));
        assert_eq!(item.field("department", false), None);
        assert_eq!(item.field("missing", false), None);
    }

    #[test]
    fn test_intrinsic_names_are_not_references() {
        let item = employee();
        assert_eq!(item.field("identifier", true), None);
    }

    #[test]
    fn test_field_values_repeat() {
        let item = employee()
            .with_attribute("departmentName", "Accounts")
            .with_reference("department", "d2");
        assert_eq!(item.field_values("departmentName", false), vec!["Finance", "Accounts"]);
        assert_eq!(item.field_values("department", true), vec!["d1", "d2"]);
        assert_eq!(item.field_values("identifier", false), vec!["e1"]);
        assert!(item.field_values("missing", false).is_empty());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"identifier":"d1","className":"Department",
            "attributes":[{"name":"name","value":"Finance"}]}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.class_name, "Department");
        assert_eq!(item.attribute("name"), Some("Finance"));
        assert!(item.references.is_empty());
        assert_eq!(item.to_string(), "Department[d1]");
    }
}
