//! Common test utilities for integration tests.
//!
//! Store wrappers that count, script or fail queries, plus a small
//! company/department/employee fixture over an in-memory SQLite store.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use itempath_core::{
    DescriptorRegistry, FieldTemplate, Item, ObjectStore, PrefetchDescriptor, Query, ResultsRow,
    Sequence, SqliteItemStore, StoreError,
};
use parking_lot::Mutex;

// ============================================================================
// Store Wrappers
// ============================================================================

/// Records every query passed to the inner store.
pub struct CountingStore<S> {
    inner: S,
    queries: Mutex<Vec<Query>>,
}

impl<S: ObjectStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        self.queries.lock().push(query.clone());
        self.inner.execute(query, sequence)
    }

    fn sequence(&self) -> Sequence {
        self.inner.sequence()
    }
}

/// Delegates the first `succeed` calls, then fails every call.
pub struct FailingStore<S> {
    inner: S,
    succeed: usize,
    calls: AtomicUsize,
}

impl<S: ObjectStore> FailingStore<S> {
    pub fn new(inner: S, succeed: usize) -> Self {
        Self {
            inner,
            succeed,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<S: ObjectStore> ObjectStore for FailingStore<S> {
    fn execute(&self, query: &Query, sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.succeed {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection lost",
            )));
        }
        self.inner.execute(query, sequence)
    }

    fn sequence(&self) -> Sequence {
        self.inner.sequence()
    }
}

/// Answers queries with pre-recorded results, in order.
#[derive(Default)]
pub struct ScriptedStore {
    responses: Mutex<VecDeque<Vec<ResultsRow>>>,
    queries: Mutex<Vec<Query>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, items: Vec<Item>) -> Self {
        let rows = items
            .into_iter()
            .map(|item| ResultsRow::single_item(Arc::new(item)))
            .collect();
        self.responses.lock().push_back(rows);
        self
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }
}

impl ObjectStore for ScriptedStore {
    fn execute(&self, query: &Query, _sequence: Sequence) -> Result<Vec<ResultsRow>, StoreError> {
        self.queries.lock().push(query.clone());
        Ok(self.responses.lock().pop_front().unwrap_or_default())
    }

    fn sequence(&self) -> Sequence {
        Sequence(0)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn company(id: &str, name: &str) -> Item {
    Item::new(id, "Company").with_attribute("name", name)
}

pub fn department(id: &str, name: &str, company: &str) -> Item {
    Item::new(id, "Department")
        .with_attribute("name", name)
        .with_reference("company", company)
}

pub fn employee(id: &str, name: &str, department_name: &str, company: &str) -> Item {
    Item::new(id, "Employee")
        .with_attribute("name", name)
        .with_attribute("departmentName", department_name)
        .with_reference("company", company)
}

/// Employees point at departments by name and (separately) at companies
/// c3/c4; departments point at companies c1/c2.
pub fn company_items() -> Vec<Item> {
    vec![
        company("c1", "Acme"),
        company("c2", "Globex"),
        company("c3", "Initech"),
        company("c4", "Umbrella"),
        department("d1", "Finance", "c1"),
        department("d2", "Sales", "c2"),
        employee("e1", "Ada", "Finance", "c3"),
        employee("e2", "Bob", "Finance", "c4"),
        employee("e3", "Cy", "Sales", "c3"),
    ]
}

pub fn company_store() -> SqliteItemStore {
    let store = SqliteItemStore::in_memory().expect("Failed to create store");
    store
        .insert_items(&company_items())
        .expect("Failed to insert fixture");
    store
}

/// Department → its company, by identifier.
pub fn department_company() -> Arc<PrefetchDescriptor> {
    Arc::new(
        PrefetchDescriptor::new(
            "department-company",
            "Department",
            vec![FieldTemplate::from_reference("identifier", "company")],
            Vec::new(),
        )
        .expect("valid descriptor"),
    )
}

/// Employee → department with the employee's `departmentName`.
pub fn employee_department(children: Vec<Arc<PrefetchDescriptor>>) -> Arc<PrefetchDescriptor> {
    Arc::new(
        PrefetchDescriptor::new(
            "employee-department",
            "Employee",
            vec![
                FieldTemplate::fixed("className", "Department"),
                FieldTemplate::from_attribute("name", "departmentName"),
            ],
            children,
        )
        .expect("valid descriptor"),
    )
}

pub fn registry_of(descriptors: Vec<Arc<PrefetchDescriptor>>) -> Arc<DescriptorRegistry> {
    let builder = descriptors
        .into_iter()
        .fold(DescriptorRegistry::builder(), |b, d| b.register(d));
    Arc::new(builder.build())
}

pub fn identifiers<'a>(items: impl IntoIterator<Item = &'a Arc<Item>>) -> Vec<String> {
    items.into_iter().map(|i| i.identifier.clone()).collect()
}
