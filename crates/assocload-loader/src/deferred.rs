//! Deferred values and the batch writer.

use crate::output::Output;
use crate::registry::{BatchKey, BatchRegistry, PendingBatch};
use assocload_core::{Error, ResolutionError, ResolutionErrorKind, Result, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A batch function: receives every distinct item key registered for its
/// batch, in first-registration order, and records outputs on the writer.
///
/// The registry is passed so the function can register nested deferred
/// values that coalesce with the rest of the traversal.
pub type BatchFn =
    Box<dyn FnOnce(&[Value], &mut BatchWriter, &BatchRegistry) -> Result<()> + Send>;

/// A placeholder for the output of one item key in a pending batch.
///
/// Forcing it through the owning registry resolves the whole batch on first
/// use. Items the batch function left unset yield the default.
#[derive(Clone)]
pub struct Deferred {
    batch: Weak<PendingBatch>,
    item: Value,
    default: Arc<Output>,
}

impl Deferred {
    pub(crate) fn new(batch: &Arc<PendingBatch>, item: Value, default: Output) -> Self {
        Self {
            batch: Arc::downgrade(batch),
            item,
            default: Arc::new(default),
        }
    }

    /// The item key this value was registered under.
    pub fn item(&self) -> &Value {
        &self.item
    }

    /// Output used when the batch function sets nothing for this item.
    pub fn default_output(&self) -> &Output {
        &self.default
    }

    /// Key of the owning batch, or `None` once the registry is gone.
    pub fn batch_key(&self) -> Option<BatchKey> {
        self.batch.upgrade().map(|b| b.key().clone())
    }

    /// Has the owning batch already run?
    pub fn is_resolved(&self) -> bool {
        self.batch.upgrade().is_some_and(|b| b.is_settled())
    }

    /// Resolve through `registry`. Same as `registry.force(self)`.
    pub fn force(&self, registry: &BatchRegistry) -> Result<Output> {
        registry.force(self)
    }

    pub(crate) fn upgrade(&self) -> Result<Arc<PendingBatch>> {
        self.batch.upgrade().ok_or_else(|| {
            Error::resolution(
                ResolutionErrorKind::ScopeDropped,
                format!("registry owning item {} was dropped", self.item),
            )
        })
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let batch = self.batch.upgrade().map(|b| b.key().label());
        f.debug_struct("Deferred")
            .field("batch", &batch)
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

/// Collects the outputs a batch function produces, keyed by item key.
#[derive(Debug)]
pub struct BatchWriter {
    label: String,
    default: Output,
    results: HashMap<Value, Output>,
}

impl BatchWriter {
    pub(crate) fn new(label: String, default: Output) -> Self {
        Self {
            label,
            default,
            results: HashMap::new(),
        }
    }

    /// Record the output for `item`, replacing any earlier one.
    pub fn set(&mut self, item: Value, output: impl Into<Output>) {
        self.results.insert(item, output.into());
    }

    /// Push `output` onto the list for `item`, starting from the batch
    /// default. Fails if the default is not a list.
    pub fn append(&mut self, item: Value, output: impl Into<Output>) -> Result<()> {
        let current = self.results.get(&item).unwrap_or(&self.default);
        if !matches!(current, Output::List(_)) {
            return Err(ResolutionError::new(
                ResolutionErrorKind::InvalidAppend,
                format!("append on item {item} requires a list"),
            )
            .batch(self.label.clone())
            .into());
        }
        if let Output::List(items) = self
            .results
            .entry(item)
            .or_insert_with(|| self.default.clone())
        {
            items.push(output.into());
        }
        Ok(())
    }

    /// Output recorded so far for `item`.
    pub fn get(&self, item: &Value) -> Option<&Output> {
        self.results.get(item)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub(crate) fn into_results(self) -> HashMap<Value, Output> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_replaces() {
        let mut writer = BatchWriter::new("author/author:default".into(), Output::null());
        writer.set(Value::BigInt(1), json!("first"));
        writer.set(Value::BigInt(1), json!("second"));
        assert_eq!(writer.len(), 1);
        assert_eq!(
            writer.get(&Value::BigInt(1)).and_then(Output::to_plain),
            Some(json!("second"))
        );
    }

    #[test]
    fn append_seeds_from_default() {
        let mut writer = BatchWriter::new("comments/comment:default".into(), Output::empty_list());
        writer.append(Value::BigInt(7), json!({"id": 1})).unwrap();
        writer.append(Value::BigInt(7), json!({"id": 2})).unwrap();
        assert_eq!(
            writer.get(&Value::BigInt(7)).and_then(Output::to_plain),
            Some(json!([{"id": 1}, {"id": 2}]))
        );
        assert!(writer.get(&Value::BigInt(8)).is_none());
    }

    #[test]
    fn append_needs_list_default() {
        let mut writer = BatchWriter::new("author/author:default".into(), Output::null());
        let err = writer.append(Value::BigInt(1), json!(1)).unwrap_err();
        assert_eq!(err.resolution_kind(), Some(ResolutionErrorKind::InvalidAppend));
        assert!(writer.is_empty());
    }
}
