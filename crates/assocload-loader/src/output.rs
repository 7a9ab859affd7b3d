//! Render output trees and the forcing walk.
//!
//! A render produces an `Output` tree whose leaves may still be deferred.
//! `force_output` walks the tree, forces every deferred leaf through the
//! registry, and keeps forcing whatever the deferred value resolved to until
//! only plain JSON remains.

use crate::deferred::Deferred;
use crate::registry::BatchRegistry;
use assocload_core::{Error, ResolutionErrorKind, Result};
use serde_json::Map;

/// A rendered value, possibly containing deferred leaves.
#[derive(Debug, Clone)]
pub enum Output {
    /// A fully known JSON value
    Plain(serde_json::Value),
    /// A list whose elements may be deferred
    List(Vec<Output>),
    /// An ordered object whose fields may be deferred
    Object(Vec<(String, Output)>),
    /// A value owned by a pending batch
    Deferred(Deferred),
}

impl Output {
    /// JSON null.
    pub fn null() -> Self {
        Output::Plain(serde_json::Value::Null)
    }

    /// An empty list, the default for collection associations.
    pub fn empty_list() -> Self {
        Output::List(Vec::new())
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Output::Deferred(_))
    }

    /// Is any leaf of this tree still deferred?
    pub fn contains_deferred(&self) -> bool {
        match self {
            Output::Plain(_) => false,
            Output::List(items) => items.iter().any(Output::contains_deferred),
            Output::Object(fields) => fields.iter().any(|(_, v)| v.contains_deferred()),
            Output::Deferred(_) => true,
        }
    }

    /// Convert a tree without deferred leaves to JSON.
    ///
    /// Returns `None` if a deferred leaf is found.
    pub fn to_plain(&self) -> Option<serde_json::Value> {
        match self {
            Output::Plain(v) => Some(v.clone()),
            Output::List(items) => items
                .iter()
                .map(Output::to_plain)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Output::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (name, value) in fields {
                    map.insert(name.clone(), value.to_plain()?);
                }
                Some(serde_json::Value::Object(map))
            }
            Output::Deferred(_) => None,
        }
    }
}

impl From<serde_json::Value> for Output {
    fn from(value: serde_json::Value) -> Self {
        Output::Plain(value)
    }
}

impl From<Deferred> for Output {
    fn from(deferred: Deferred) -> Self {
        Output::Deferred(deferred)
    }
}

impl From<Vec<Output>> for Output {
    fn from(items: Vec<Output>) -> Self {
        Output::List(items)
    }
}

/// Force every deferred leaf of `output` and return the plain JSON tree.
///
/// Sibling deferred values that share a batch trigger one batch function
/// call; the rest are answered from the resolved batch. Nesting deeper than
/// the registry's `max_force_depth` fails with `DepthExceeded`.
pub fn force_output(output: &Output, registry: &BatchRegistry) -> Result<serde_json::Value> {
    force_at(output, registry, 0)
}

fn force_at(output: &Output, registry: &BatchRegistry, depth: usize) -> Result<serde_json::Value> {
    match output {
        Output::Plain(v) => Ok(v.clone()),
        Output::List(items) => items
            .iter()
            .map(|item| force_at(item, registry, depth))
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        Output::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, value) in fields {
                map.insert(name.clone(), force_at(value, registry, depth)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        Output::Deferred(deferred) => {
            let limit = registry.config().max_force_depth;
            if depth >= limit {
                return Err(Error::resolution(
                    ResolutionErrorKind::DepthExceeded,
                    format!("deferred values nested deeper than {limit}"),
                ));
            }
            let resolved = registry.force(deferred)?;
            force_at(&resolved, registry, depth + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_trees_need_no_registry() {
        let tree = Output::Object(vec![
            ("id".to_string(), json!(1).into()),
            (
                "tags".to_string(),
                Output::List(vec![json!("a").into(), json!("b").into()]),
            ),
        ]);
        assert!(!tree.contains_deferred());
        assert_eq!(tree.to_plain(), Some(json!({"id": 1, "tags": ["a", "b"]})));
    }

    #[test]
    fn object_keeps_field_order() {
        let tree = Output::Object(vec![
            ("z".to_string(), json!(1).into()),
            ("a".to_string(), json!(2).into()),
        ]);
        let registry = BatchRegistry::new();
        let value = force_output(&tree, &registry).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn defaults() {
        assert_eq!(Output::null().to_plain(), Some(serde_json::Value::Null));
        assert_eq!(Output::empty_list().to_plain(), Some(json!([])));
    }
}
