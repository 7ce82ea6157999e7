//! Query AST
//!
//! A small object-query language over the generic item model: aliased
//! entity references (`QueryClass`), field references, collection
//! membership and value equality constraints, and nested AND/OR sets.
//! Stores compile it to their own dialect.

use std::fmt;

/// The generic entities a query ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Item,
    Attribute,
    Reference,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Item => "Item",
            Table::Attribute => "Attribute",
            Table::Reference => "Reference",
        }
    }
}

/// An aliased entity in a query's FROM list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryClass {
    pub alias: usize,
    pub table: Table,
}

/// Columns addressable through [`QueryField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// `Item.identifier`
    Identifier,
    /// `Item.className`
    ClassName,
    /// `Attribute.name` / `Reference.name`
    Name,
    /// `Attribute.value`
    Value,
    /// `Reference.refId`
    RefId,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Identifier => "identifier",
            Column::ClassName => "className",
            Column::Name => "name",
            Column::Value => "value",
            Column::RefId => "refId",
        }
    }

    /// Whether this column exists on `table`.
    pub fn belongs_to(&self, table: Table) -> bool {
        matches!(
            (table, self),
            (Table::Item, Column::Identifier | Column::ClassName)
                | (Table::Attribute, Column::Name | Column::Value)
                | (Table::Reference, Column::Name | Column::RefId)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryField {
    pub class: QueryClass,
    pub column: Column,
}

impl QueryField {
    pub fn new(class: QueryClass, column: Column) -> Self {
        Self { class, column }
    }
}

/// The attribute or reference collection of an item class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Attributes,
    References,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub owner: QueryClass,
    pub collection: Collection,
}

impl CollectionRef {
    pub fn new(owner: QueryClass, collection: Collection) -> Self {
        Self { owner, collection }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `field = value`
    Equals { field: QueryField, value: String },
    /// `collection CONTAINS member`
    Contains {
        collection: CollectionRef,
        member: QueryClass,
    },
    /// Nested group
    Set(ConstraintSet),
}

impl Constraint {
    pub fn equals(field: QueryField, value: impl Into<String>) -> Self {
        Constraint::Equals {
            field,
            value: value.into(),
        }
    }

    pub fn contains(collection: CollectionRef, member: QueryClass) -> Self {
        Constraint::Contains { collection, member }
    }
}

/// A group of constraints joined by one operator. An empty AND is true,
/// an empty OR is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSet {
    pub op: ConstraintOp,
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(op: ConstraintOp) -> Self {
        Self {
            op,
            constraints: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(ConstraintOp::And)
    }

    pub fn or() -> Self {
        Self::new(ConstraintOp::Or)
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// A query over items, their attributes and references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    from: Vec<QueryClass>,
    select: Vec<QueryClass>,
    constraint: Option<ConstraintSet>,
    distinct: bool,
    batch_size: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            from: Vec::new(),
            select: Vec::new(),
            constraint: None,
            distinct: true,
            batch_size: None,
        }
    }

    /// Every item of `class_name`; the usual root batch query.
    pub fn items_of_class(class_name: &str) -> Self {
        let mut query = Self::new();
        let item = query.add_from(Table::Item);
        query.add_to_select(item);
        let mut cs = ConstraintSet::and();
        cs.add(Constraint::equals(
            QueryField::new(item, Column::ClassName),
            class_name,
        ));
        query.set_constraint(cs);
        query
    }

    /// Add an entity to the FROM list and return its handle.
    pub fn add_from(&mut self, table: Table) -> QueryClass {
        let class = QueryClass {
            alias: self.from.len(),
            table,
        };
        self.from.push(class);
        class
    }

    pub fn add_to_select(&mut self, class: QueryClass) {
        self.select.push(class);
    }

    pub fn set_constraint(&mut self, constraint: ConstraintSet) {
        self.constraint = Some(constraint);
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = Some(batch_size);
    }

    pub fn from(&self) -> &[QueryClass] {
        &self.from
    }

    pub fn select(&self) -> &[QueryClass] {
        &self.select
    }

    pub fn constraint(&self) -> Option<&ConstraintSet> {
        self.constraint.as_ref()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// True if the query returns exactly one column and it is an item.
    pub fn selects_single_item(&self) -> bool {
        matches!(self.select.as_slice(), [class] if class.table == Table::Item)
    }
}

fn alias_name(class: &QueryClass) -> String {
    let prefix = match class.table {
        Table::Item => "i",
        Table::Attribute => "a",
        Table::Reference => "r",
    };
    format!("{}{}", prefix, class.alias)
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", alias_name(&self.class), self.column.as_str())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equals { field, value } => write!(f, "{} = '{}'", field, value),
            Constraint::Contains { collection, member } => {
                let name = match collection.collection {
                    Collection::Attributes => "attributes",
                    Collection::References => "references",
                };
                write!(
                    f,
                    "{}.{} CONTAINS {}",
                    alias_name(&collection.owner),
                    name,
                    alias_name(member)
                )
            }
            Constraint::Set(cs) => write!(f, "{}", cs),
        }
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return match self.op {
                ConstraintOp::And => write!(f, "true"),
                ConstraintOp::Or => write!(f, "false"),
            };
        }
        let sep = match self.op {
            ConstraintOp::And => " AND ",
            ConstraintOp::Or => " OR ",
        };
        write!(f, "(")?;
        for (i, c) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", sep)?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        let select: Vec<String> = self.select.iter().map(alias_name).collect();
        let from: Vec<String> = self
            .from
            .iter()
            .map(|c| format!("{} AS {}", c.table.as_str(), alias_name(c)))
            .collect();
        write!(f, "{} FROM {}", select.join(", "), from.join(", "))?;
        if let Some(cs) = &self.constraint {
            write!(f, " WHERE {}", cs)?;
        }
        Ok(())
    }
}
