//! Prefetch integration tests for itempath-core.
//!
//! These tests run the path-following store over a real SQLite item store:
//! - End-to-end department prefetch for a batch of employees
//! - Second-hop expansion through child descriptors
//! - Pass-through behaviour without descriptors
//! - Memoized single-description lookups, including from many threads
//! - Building the engine from a TOML configuration file
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package itempath-core --test prefetch_integration
//! ```

mod common;

use std::sync::Arc;

use itempath_config::ConfigLoader;
use itempath_core::{
    Collection, CollectionRef, Column, Constraint, ConstraintSet, Description, DescriptorRegistry,
    FieldMatch, Item, ObjectStore, PathFollowingStore, Query, QueryField, SqliteItemStore, Table,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{
    company_store, department_company, employee_department, identifiers, registry_of,
    CountingStore,
};

fn department_named(name: &str) -> Description {
    Description::new()
        .with(FieldMatch::attribute("className", "Department"))
        .with(FieldMatch::attribute("name", name))
}

fn company_with_id(id: &str) -> Description {
    Description::new().with(FieldMatch::attribute("identifier", id))
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_employees_prefetch_their_departments_in_one_query() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()))
        .with_descriptors(registry_of(vec![employee_department(Vec::new())]));

    let results = store
        .execute_batch(&Query::items_of_class("Employee"))
        .unwrap();

    // Root query plus exactly one batch for {Finance, Sales}
    assert_eq!(results.len(), 3);
    assert_eq!(store.inner().count(), 2);
    assert_eq!(results.stats().queries, 1);
    assert_eq!(identifiers(results.holder().items()), vec!["d1", "d2"]);

    // Each employee's department lookup is served from the same cached list
    let descriptor = &store.registry().unwrap().descriptors_for("Employee")[0];
    let finance = store.get_items_by_description(&department_named("Finance")).unwrap();
    for row in results.iter() {
        let employee = row.item(0).unwrap();
        let description = descriptor.description_for(employee).unwrap();
        let departments = store.get_items_by_description(&description).unwrap();
        assert_eq!(departments.len(), 1);
        if employee.attribute("departmentName") == Some("Finance") {
            assert!(Arc::ptr_eq(&departments, &finance));
        }
        assert!(results
            .holder()
            .lists()
            .iter()
            .any(|list| Arc::ptr_eq(list, &departments)));
    }
    assert_eq!(store.inner().count(), 2);
}

#[test]
fn test_second_hop_is_seeded_from_first_hop_results() {
    let store = PathFollowingStore::new(CountingStore::new(company_store())).with_descriptors(
        registry_of(vec![employee_department(vec![department_company()])]),
    );

    let results = store
        .execute_batch(&Query::items_of_class("Employee"))
        .unwrap();

    assert_eq!(results.stats().work_items, 2);
    assert_eq!(results.stats().queries, 2);
    assert_eq!(store.inner().count(), 3);
    assert_eq!(
        identifiers(results.holder().items()),
        vec!["d1", "d2", "c1", "c2"]
    );

    // Companies the employees reference directly were never requested
    let cache = store.cache();
    assert!(cache.contains(&company_with_id("c1")));
    assert!(cache.contains(&company_with_id("c2")));
    assert!(!cache.contains(&company_with_id("c3")));
    assert!(!cache.contains(&company_with_id("c4")));

    let second_hop = store.inner().queries()[2].to_string();
    assert!(second_hop.contains("'c1'") && second_hop.contains("'c2'"));
    assert!(!second_hop.contains("'c3'"));
}

#[test]
fn test_second_sweep_is_served_from_cache() {
    let store = PathFollowingStore::new(CountingStore::new(company_store())).with_descriptors(
        registry_of(vec![employee_department(vec![department_company()])]),
    );
    let query = Query::items_of_class("Employee");

    store.execute_batch(&query).unwrap();
    let before = store.inner().count();
    let again = store.execute_batch(&query).unwrap();

    // Only the root query runs; both departments hit the cache and no
    // children are expanded from cache hits
    assert_eq!(store.inner().count(), before + 1);
    assert_eq!(again.stats().cache_hits, 2);
    assert_eq!(again.stats().queries, 0);
    assert_eq!(identifiers(again.holder().items()), vec!["d1", "d2"]);
}

// ============================================================================
// Pass-through
// ============================================================================

fn attribute_query() -> Query {
    let mut query = Query::new();
    let item = query.add_from(Table::Item);
    let attribute = query.add_from(Table::Attribute);
    query.add_to_select(attribute);
    let mut cs = ConstraintSet::and();
    cs.add(Constraint::contains(
        CollectionRef::new(item, Collection::Attributes),
        attribute,
    ));
    cs.add(Constraint::equals(
        QueryField::new(item, Column::ClassName),
        "Employee",
    ));
    query.set_constraint(cs);
    query
}

#[test]
fn test_pass_through_without_descriptors() {
    let plain = company_store();
    let store = PathFollowingStore::new(CountingStore::new(company_store()));

    for query in [Query::items_of_class("Employee"), attribute_query()] {
        let expected = plain.execute(&query, plain.sequence()).unwrap();
        let results = store.execute_batch(&query).unwrap();
        assert_eq!(results.rows(), expected.as_slice());
        assert!(results.holder().is_empty());
    }
    assert_eq!(store.inner().count(), 2);
    assert!(store.cache().is_empty());
}

#[test]
fn test_pass_through_with_empty_registry() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()))
        .with_descriptors(Arc::new(DescriptorRegistry::default()));
    assert!(!store.is_prefetching());

    let rows = ObjectStore::execute(
        &store,
        &Query::items_of_class("Employee"),
        store.sequence(),
    )
    .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(store.inner().count(), 1);
    assert!(store.cache().is_empty());
}

#[test]
fn test_non_item_select_does_not_prefetch() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()))
        .with_descriptors(registry_of(vec![employee_department(Vec::new())]));

    let results = store.execute_batch(&attribute_query()).unwrap();
    assert!(!results.is_empty());
    assert!(results.holder().is_empty());
    assert_eq!(store.inner().count(), 1);
}

#[test]
fn test_empty_root_batch_does_not_prefetch() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()))
        .with_descriptors(registry_of(vec![employee_department(Vec::new())]));

    let results = store
        .execute_batch(&Query::items_of_class("Contractor"))
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(store.inner().count(), 1);
}

// ============================================================================
// Single-description lookups
// ============================================================================

#[test]
fn test_lookup_is_memoized() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()));

    let first = store.get_items_by_description(&department_named("Finance")).unwrap();
    let reordered: Description = vec![
        FieldMatch::attribute("name", "Finance"),
        FieldMatch::attribute("className", "Department"),
    ]
    .into_iter()
    .collect();
    let second = store.get_items_by_description(&reordered).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(identifiers(first.iter()), vec!["d1"]);
    assert_eq!(store.inner().count(), 1);
    assert!(!store.inner().queries()[0].is_distinct());
}

#[test]
fn test_lookup_lists_a_repeated_match_once() {
    let inner = SqliteItemStore::in_memory().unwrap();
    inner
        .insert_items(&[Item::new("d9", "Department")
            .with_attribute("name", "Audit")
            .with_attribute("name", "Audit")])
        .unwrap();
    let store = PathFollowingStore::new(inner);

    let items = store.get_items_by_description(&department_named("Audit")).unwrap();
    assert_eq!(identifiers(items.iter()), vec!["d9"]);
}

#[test]
fn test_lookup_caches_empty_results() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()));
    let nowhere = department_named("Legal");

    assert!(store.get_items_by_description(&nowhere).unwrap().is_empty());
    assert!(store.get_items_by_description(&nowhere).unwrap().is_empty());
    assert_eq!(store.inner().count(), 1);

    let metrics = store.cache().metrics();
    assert_eq!(metrics.lookups, 2);
    assert_eq!(metrics.misses, 1);
}

#[test]
fn test_lookup_by_reference() {
    let store = PathFollowingStore::new(company_store());
    let description = Description::new()
        .with(FieldMatch::attribute("className", "Employee"))
        .with(FieldMatch::reference("company", "c3"));

    let employees = store.get_items_by_description(&description).unwrap();
    assert_eq!(identifiers(employees.iter()), vec!["e1", "e3"]);
}

#[test]
fn test_concurrent_lookups_share_the_cache() {
    let store = PathFollowingStore::new(CountingStore::new(company_store()));
    let names = ["Finance", "Sales", "Legal"];

    std::thread::scope(|s| {
        for t in 0..8 {
            let store = &store;
            s.spawn(move || {
                for round in 0..10 {
                    let name = names[(t + round) % names.len()];
                    let items = store.get_items_by_description(&department_named(name)).unwrap();
                    let expected = match name {
                        "Finance" => vec!["d1"],
                        "Sales" => vec!["d2"],
                        _ => vec![],
                    };
                    assert_eq!(identifiers(items.iter()), expected);
                }
            });
        }
    });

    let metrics = store.cache().metrics();
    assert_eq!(metrics.lookups, 80);
    assert_eq!(store.cache().len(), 3);
    // Racing misses may query twice, never more than once per thread
    assert!(store.inner().count() >= 3 && store.inner().count() <= 24);
}

// ============================================================================
// Configuration
// ============================================================================

const CONFIG: &str = r#"
[cache]
capacity = 64

[prefetch]
batch_size = 500

[[prefetch.descriptors]]
name = "employee-department"
owner_class = "Employee"
children = ["department-company"]
fields = [
    { field = "className", value = "Department" },
    { field = "name", from = "departmentName" },
]

[[prefetch.descriptors]]
name = "department-company"
owner_class = "Department"
root = false
fields = [{ field = "identifier", from = "company", from_reference = true }]
"#;

#[test]
fn test_engine_from_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = ConfigLoader::load_file(&path, None).unwrap();

    let store =
        PathFollowingStore::from_config(CountingStore::new(company_store()), &config).unwrap();
    assert!(store.is_prefetching());
    assert!(store.cache().is_bounded());
    assert_eq!(store.options().batch_size, 500);

    let results = store
        .execute_batch(&Query::items_of_class("Employee"))
        .unwrap();
    assert_eq!(
        identifiers(results.holder().items()),
        vec!["d1", "d2", "c1", "c2"]
    );
    assert!(store
        .inner()
        .queries()
        .iter()
        .skip(1)
        .all(|q| q.batch_size() == Some(500) && !q.is_distinct()));
}

#[test]
fn test_disabled_prefetch_from_config() {
    let mut config = itempath_config::ItempathConfig::default();
    config.prefetch.enabled = false;

    let store =
        PathFollowingStore::from_config(CountingStore::new(company_store()), &config).unwrap();
    assert!(!store.is_prefetching());
    store
        .execute_batch(&Query::items_of_class("Employee"))
        .unwrap();
    assert_eq!(store.inner().count(), 1);
}
