//! Batch Query Builder
//!
//! Compiles descriptions into item queries. A batch query answers many
//! same-shape descriptions at once:
//!
//! ```text
//! SELECT i0 FROM Item i0, Attribute a1, ...
//! WHERE  i0.attributes CONTAINS a1 AND a1.name = 'name'   -- joins
//!   AND  i0.className = 'Department'                      -- shared statics
//!   AND  ((a1.value = 'Finance') OR (a1.value = 'Sales'))  -- one disjunct each
//! ```

use crate::description::{Description, FieldMatch};
use crate::descriptor::PrefetchDescriptor;
use crate::item::{CLASS_NAME_FIELD, IDENTIFIER_FIELD};
use crate::query::{
    Collection, CollectionRef, Column, Constraint, ConstraintSet, Query, QueryClass, QueryField,
    Table,
};
use crate::store::StoreError;
use std::collections::BTreeSet;

fn intrinsic_column(field: &FieldMatch) -> Option<Column> {
    if field.is_reference {
        return None;
    }
    match field.field_name.as_str() {
        IDENTIFIER_FIELD => Some(Column::Identifier),
        CLASS_NAME_FIELD => Some(Column::ClassName),
        _ => None,
    }
}

/// Bind `field` onto `item`: intrinsic fields map straight to an item column,
/// the rest join the attribute or reference collection and fix its name.
/// Returns the column that carries the field's value.
fn bind_field(
    query: &mut Query,
    item: QueryClass,
    shared: &mut ConstraintSet,
    field: &FieldMatch,
) -> QueryField {
    if let Some(column) = intrinsic_column(field) {
        return QueryField::new(item, column);
    }

    let (table, collection, value_column) = if field.is_reference {
        (Table::Reference, Collection::References, Column::RefId)
    } else {
        (Table::Attribute, Collection::Attributes, Column::Value)
    };
    let member = query.add_from(table);
    shared.add(Constraint::contains(
        CollectionRef::new(item, collection),
        member,
    ));
    shared.add(Constraint::equals(
        QueryField::new(member, Column::Name),
        field.field_name.as_str(),
    ));
    QueryField::new(member, value_column)
}

/// Query for the items matching exactly one description.
pub fn build_description_query(
    description: &Description,
    batch_size: usize,
) -> Result<Query, StoreError> {
    if description.is_empty() {
        return Err(StoreError::invalid_query("cannot look up an empty description"));
    }

    let mut query = Query::new();
    let item = query.add_from(Table::Item);
    query.add_to_select(item);
    query.set_distinct(false);
    query.set_batch_size(batch_size);

    let mut constraints = ConstraintSet::and();
    for field in description {
        let value_field = bind_field(&mut query, item, &mut constraints, field);
        constraints.add(Constraint::equals(value_field, field.value.as_str()));
    }
    query.set_constraint(constraints);
    Ok(query)
}

/// One query answering every description in `descriptions`, all produced by
/// `descriptor`.
///
/// The first description is the shape template. Fields the descriptor marks
/// static are constrained once in the shared block; derived fields get one
/// AND-group per description inside a single OR.
pub fn build_batch_query(
    descriptor: &PrefetchDescriptor,
    descriptions: &BTreeSet<Description>,
    batch_size: usize,
) -> Result<Query, StoreError> {
    let template = descriptions.iter().next().ok_or_else(|| {
        StoreError::invalid_query(format!(
            "batch for descriptor '{}' has no descriptions",
            descriptor.name()
        ))
    })?;

    let mut query = Query::new();
    let item = query.add_from(Table::Item);
    query.add_to_select(item);
    query.set_distinct(false);
    query.set_batch_size(batch_size);

    let mut shared = ConstraintSet::and();
    let mut statics: Vec<&FieldMatch> = Vec::new();
    let mut derived: Vec<(&FieldMatch, QueryField)> = Vec::new();
    for field in template {
        let value_field = bind_field(&mut query, item, &mut shared, field);
        if descriptor.is_static(field) {
            shared.add(Constraint::equals(value_field, field.value.as_str()));
            statics.push(field);
        } else {
            derived.push((field, value_field));
        }
    }

    let mut disjuncts = ConstraintSet::or();
    for description in descriptions {
        let same_shape = description.len() == template.len()
            && statics.iter().all(|f| description.contains(f));
        if !same_shape {
            return Err(mismatched_shape(descriptor, description, template));
        }

        let mut disjunct = ConstraintSet::and();
        for (shape, value_field) in &derived {
            let field = description
                .iter()
                .find(|f| f.field_name == shape.field_name && f.is_reference == shape.is_reference)
                .ok_or_else(|| mismatched_shape(descriptor, description, template))?;
            disjunct.add(Constraint::equals(*value_field, field.value.as_str()));
        }
        disjuncts.add(Constraint::Set(disjunct));
    }

    if !derived.is_empty() {
        shared.add(Constraint::Set(disjuncts));
    }
    query.set_constraint(shared);
    Ok(query)
}

fn mismatched_shape(
    descriptor: &PrefetchDescriptor,
    description: &Description,
    template: &Description,
) -> StoreError {
    StoreError::invalid_query(format!(
        "description {} does not share the shape of {} under descriptor '{}'",
        description,
        template,
        descriptor.name()
    ))
}
