//! Record store boundary.
//!
//! The extraction policy only ever asks one question of a store: "all
//! records of kind K whose attribute A is one of these keys, narrowed by this
//! scope". `MemoryStore` answers it from in-memory tables and counts how
//! often it was asked.

use assocload_core::{Error, Record, Result, Scope, StoreError, StoreErrorKind, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Bulk lookup of records by attribute.
pub trait RecordStore: Send + Sync {
    /// Fetch every record of `kind` whose `attribute` equals one of `keys`
    /// and that satisfies `scope`, in the store's natural order (or the
    /// scope's ordering, if it has one).
    fn find_where(&self, kind: &str, attribute: &str, keys: &[Value], scope: &Scope) -> Result<Vec<Record>>;
}

/// In-memory record store.
///
/// Tables keep insertion order. Every `find_where` call counts as one query,
/// successful or not.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    failing: RwLock<HashSet<String>>,
    queries: AtomicUsize,
    queries_by_kind: RwLock<HashMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an (initially empty) table for `kind`.
    #[must_use]
    pub fn table(self, kind: &str) -> Self {
        write(&self.tables).entry(kind.to_string()).or_default();
        self
    }

    /// Builder form of `insert`.
    #[must_use]
    pub fn with(self, record: Record) -> Self {
        self.insert(record);
        self
    }

    /// Append a record to the table of its kind.
    pub fn insert(&self, record: Record) {
        write(&self.tables)
            .entry(record.kind().to_string())
            .or_default()
            .push(record);
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = Record>) {
        let mut tables = write(&self.tables);
        for record in records {
            tables.entry(record.kind().to_string()).or_default().push(record);
        }
    }

    /// Number of records stored for `kind`.
    pub fn count(&self, kind: &str) -> usize {
        read(&self.tables).get(kind).map_or(0, Vec::len)
    }

    /// Make every lookup of `kind` fail with `StoreErrorKind::Unavailable`.
    pub fn fail_kind(&self, kind: &str) {
        write(&self.failing).insert(kind.to_string());
    }

    pub fn clear_failures(&self) {
        write(&self.failing).clear();
    }

    /// Total `find_where` calls.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// `find_where` calls for one record kind.
    pub fn queries_for(&self, kind: &str) -> usize {
        read(&self.queries_by_kind).get(kind).copied().unwrap_or(0)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
        write(&self.queries_by_kind).clear();
    }
}

impl RecordStore for MemoryStore {
    fn find_where(&self, kind: &str, attribute: &str, keys: &[Value], scope: &Scope) -> Result<Vec<Record>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *write(&self.queries_by_kind).entry(kind.to_string()).or_insert(0) += 1;

        tracing::trace!(
            target: "assocload::store",
            kind = kind,
            attribute = attribute,
            keys = keys.len(),
            filters = scope.filters().len(),
            "find_where"
        );

        if read(&self.failing).contains(kind) {
            return Err(Error::Store(StoreError::new(
                StoreErrorKind::Unavailable,
                format!("lookup of '{kind}' failed"),
            )));
        }

        let tables = read(&self.tables);
        let Some(table) = tables.get(kind) else {
            return Err(Error::Store(StoreError::new(
                StoreErrorKind::UnknownKind,
                format!("unknown record kind '{kind}'"),
            )));
        };

        let wanted: HashSet<&Value> = keys.iter().collect();
        let mut found: Vec<Record> = table
            .iter()
            .filter(|r| r.get(attribute).is_some_and(|v| wanted.contains(v)))
            .filter(|r| scope.matches(r))
            .cloned()
            .collect();
        scope.sort(&mut found);
        Ok(found)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
