//! Scopes narrowing a bulk lookup.
//!
//! A scope is part of a batch key, so it is plain data: equality filters and
//! an ordering, compared structurally. Stores interpret it; the in-memory
//! store evaluates it with `matches` and `sort`.

use crate::record::Record;
use crate::value::Value;
use std::cmp::Ordering;

/// One filter condition on an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// `attribute = value`
    Eq(String, Value),
    /// `attribute <> value`
    NotEq(String, Value),
    /// `attribute IN (values)`
    In(String, Vec<Value>),
    /// `attribute IS NULL`
    IsNull(String),
    /// `attribute IS NOT NULL`
    NotNull(String),
}

impl Filter {
    /// Evaluate this filter against a record. A missing attribute reads as null.
    pub fn matches(&self, record: &Record) -> bool {
        let read = |name: &str| record.get(name).cloned().unwrap_or(Value::Null);
        match self {
            Filter::Eq(attr, v) => &read(attr) == v,
            Filter::NotEq(attr, v) => &read(attr) != v,
            Filter::In(attr, vs) => vs.contains(&read(attr)),
            Filter::IsNull(attr) => read(attr).is_null(),
            Filter::NotNull(attr) => !read(attr).is_null(),
        }
    }
}

/// Ordering on one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub attribute: String,
    pub descending: bool,
}

/// Filters and ordering applied on top of the join-key lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    filters: Vec<Filter>,
    order: Vec<OrderBy>,
}

impl Scope {
    /// The empty scope: no filters, store order.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn where_eq(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(attribute.into(), value.into()))
    }

    #[must_use]
    pub fn where_not_null(self, attribute: impl Into<String>) -> Self {
        self.filter(Filter::NotNull(attribute.into()))
    }

    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            attribute: attribute.into(),
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, attribute: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            attribute: attribute.into(),
            descending: true,
        });
        self
    }

    /// Combine two scopes; `other`'s filters and ordering come after ours.
    #[must_use]
    pub fn merge(mut self, other: &Scope) -> Self {
        self.filters.extend(other.filters.iter().cloned());
        self.order.extend(other.order.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.order.is_empty()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order
    }

    /// Does `record` satisfy every filter?
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Stable-sort `records` by the scope's ordering. No ordering, no change.
    pub fn sort(&self, records: &mut [Record]) {
        if self.order.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for o in &self.order {
                let ord = compare(a.get(&o.attribute), b.get(&o.attribute));
                let ord = if o.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

/// Nulls sort first; values of different types compare by type name.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::BigInt(x), Value::BigInt(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::BigInt(x), Value::Double(y)) => (*x as f64).total_cmp(y),
        (Value::Double(x), Value::BigInt(y)) => x.total_cmp(&(*y as f64)),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Uuid(x), Value::Uuid(y)) => x.cmp(y),
        (x, y) => x.type_name().cmp(y.type_name()),
    }
}
