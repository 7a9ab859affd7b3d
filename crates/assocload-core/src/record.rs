//! Record representation.
//!
//! A `Record` is what the record store hands back and what renderers read:
//! the record kind plus named attribute values. Attribute metadata is shared
//! across all records of one result set.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute metadata shared across all records of a result set.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    /// Attribute names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl AttributeInfo {
    /// Create new attribute info from a list of attribute names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of an attribute by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Check if an attribute exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single record of some kind.
#[derive(Debug, Clone)]
pub struct Record {
    kind: Arc<str>,
    values: Vec<Value>,
    attributes: Arc<AttributeInfo>,
}

impl Record {
    /// Create a record from `(name, value)` pairs.
    ///
    /// For many records of the same shape, prefer `with_attributes` to share
    /// the attribute metadata.
    pub fn new<I, K, V>(kind: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            kind: Arc::from(kind),
            values,
            attributes: Arc::new(AttributeInfo::new(names)),
        }
    }

    /// Create a record with shared attribute metadata.
    pub fn with_attributes(kind: Arc<str>, attributes: Arc<AttributeInfo>, values: Vec<Value>) -> Self {
        Self {
            kind,
            values,
            attributes,
        }
    }

    /// The record kind (e.g. `"comment"`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get the shared attribute metadata.
    pub fn attribute_info(&self) -> Arc<AttributeInfo> {
        Arc::clone(&self.attributes)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get an attribute value by name. O(1) via HashMap lookup.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .index_of(name)
            .and_then(|i| self.values.get(i))
    }

    /// Check if an attribute exists by name.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Get an attribute as `i64`.
    #[allow(clippy::result_large_err)]
    pub fn get_i64(&self, name: &str) -> Result<i64> {
        let value = self.get(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: "i64",
                actual: format!("attribute '{}' not found on {}", name, self.kind),
                attribute: Some(name.to_string()),
            })
        })?;
        value.as_i64().ok_or_else(|| {
            Error::Type(TypeError {
                expected: "i64",
                actual: value.type_name().to_string(),
                attribute: Some(name.to_string()),
            })
        })
    }

    /// Iterate over (attribute_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_basic_access() {
        let record = Record::new(
            "post",
            [
                ("id", Value::BigInt(1)),
                ("title", Value::from("Hello")),
                ("author_id", Value::Null),
            ],
        );

        assert_eq!(record.kind(), "post");
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("id"), Some(&Value::BigInt(1)));
        assert_eq!(record.get("author_id"), Some(&Value::Null));
        assert!(record.get("missing").is_none());
        assert!(record.contains("title"));
    }

    #[test]
    fn shared_attributes() {
        let first = Record::new("tag", [("id", 1i64), ("post_id", 9i64)]);
        let second = Record::with_attributes(
            Arc::from("tag"),
            first.attribute_info(),
            vec![Value::BigInt(2), Value::BigInt(9)],
        );
        assert!(Arc::ptr_eq(&first.attribute_info(), &second.attribute_info()));
        assert_eq!(second.get_i64("id").unwrap(), 2);
    }

    #[test]
    fn typed_access_errors() {
        let record = Record::new("post", [("title", "x")]);
        assert!(record.get_i64("title").is_err());
        assert!(record.get_i64("missing").is_err());
    }

    #[test]
    fn iterates_in_order() {
        let record = Record::new("post", [("a", 1i64), ("b", 2i64)]);
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
