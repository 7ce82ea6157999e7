//! Descriptions: structural fingerprints of fetch requests.
//!
//! A [`Description`] is an unordered set of [`FieldMatch`] criteria. It is
//! stored as a sorted, de-duplicated vector so that equality, ordering and
//! hashing never depend on the order criteria were added in.

use crate::item::is_intrinsic_field;
use serde::{Deserialize, Serialize};

/// One criterion: "attribute `field_name` = `value`" or
/// "reference `field_name` → item `value`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field_name: String,
    pub value: String,
    pub is_reference: bool,
}

impl FieldMatch {
    pub fn new(field_name: impl Into<String>, value: impl Into<String>, is_reference: bool) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
            is_reference,
        }
    }

    /// Attribute (or intrinsic field) equality.
    pub fn attribute(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field_name, value, false)
    }

    /// Reference pointing at the item with identifier `ref_id`.
    pub fn reference(field_name: impl Into<String>, ref_id: impl Into<String>) -> Self {
        Self::new(field_name, ref_id, true)
    }

    /// True if this criterion binds to a column of the item row itself.
    pub fn is_intrinsic(&self) -> bool {
        !self.is_reference && is_intrinsic_field(&self.field_name)
    }
}

impl std::fmt::Display for FieldMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_reference {
            write!(f, "{}->{}", self.field_name, self.value)
        } else {
            write!(f, "{}={}", self.field_name, self.value)
        }
    }
}

/// A set of field criteria; the descriptive cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Description {
    fields: Vec<FieldMatch>,
}

impl Description {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion, keeping the canonical order. Returns false if it was already present.
    pub fn insert(&mut self, field: FieldMatch) -> bool {
        match self.fields.binary_search(&field) {
            Ok(_) => false,
            Err(pos) => {
                self.fields.insert(pos, field);
                true
            }
        }
    }

    pub fn with(mut self, field: FieldMatch) -> Self {
        self.insert(field);
        self
    }

    pub fn contains(&self, field: &FieldMatch) -> bool {
        self.fields.binary_search(field).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMatch> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &[FieldMatch] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldMatch> for Description {
    fn from_iter<I: IntoIterator<Item = FieldMatch>>(iter: I) -> Self {
        let mut fields: Vec<FieldMatch> = iter.into_iter().collect();
        fields.sort();
        fields.dedup();
        Self { fields }
    }
}

impl<'a> IntoIterator for &'a Description {
    type Item = &'a FieldMatch;
    type IntoIter = std::slice::Iter<'a, FieldMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl std::fmt::Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "}}")
    }
}
