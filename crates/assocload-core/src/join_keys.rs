//! Join-key resolution.
//!
//! Resolves which attribute on the target record and which attribute on the
//! parent record correlate an association. The accessor style used to read
//! the relation metadata is picked once, in configuration.

use crate::relationship::AssociationDescriptor;
use std::str::FromStr;

/// The attribute pair that correlates parent and associated records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKeys {
    /// Attribute on the associated record, used in the bulk `IN` lookup and
    /// to bucket results back to their parent.
    pub key: String,
    /// Attribute on the parent record whose value is the item key.
    pub foreign_key: String,
}

impl JoinKeys {
    pub fn new(key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

/// How relation metadata is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinKeyStrategy {
    /// Read both attributes from the single composite accessor.
    #[default]
    Composite,
    /// Read each attribute from its own accessor.
    Split,
}

impl JoinKeyStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinKeyStrategy::Composite => "composite",
            JoinKeyStrategy::Split => "split",
        }
    }
}

impl FromStr for JoinKeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "composite" => Ok(JoinKeyStrategy::Composite),
            "split" => Ok(JoinKeyStrategy::Split),
            other => Err(format!(
                "unknown join key strategy '{other}' (expected 'composite' or 'split')"
            )),
        }
    }
}

/// Resolves join keys for association descriptors.
///
/// Resolution is a pure function of the descriptor, cheap enough to redo for
/// every parent record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinKeyResolver {
    strategy: JoinKeyStrategy,
}

impl JoinKeyResolver {
    pub const fn new(strategy: JoinKeyStrategy) -> Self {
        Self { strategy }
    }

    pub const fn strategy(&self) -> JoinKeyStrategy {
        self.strategy
    }

    /// Resolve the `(key, foreign_key)` pair for `descriptor`.
    pub fn resolve(&self, descriptor: &AssociationDescriptor) -> JoinKeys {
        let metadata = descriptor.metadata();
        match self.strategy {
            JoinKeyStrategy::Composite => metadata.join_keys(),
            JoinKeyStrategy::Split => JoinKeys::new(
                metadata.join_primary_key(),
                metadata.join_foreign_key(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::{RelationKind, RelationMetadata, Reflection};

    /// Metadata whose composite accessor is implemented separately from the
    /// split accessors, as a host reflection layer would.
    #[derive(Debug)]
    struct HostReflection {
        kind: RelationKind,
    }

    impl RelationMetadata for HostReflection {
        fn kind(&self) -> &RelationKind {
            &self.kind
        }

        fn join_primary_key(&self) -> &str {
            "post_id"
        }

        fn join_foreign_key(&self) -> &str {
            "id"
        }

        fn join_keys(&self) -> JoinKeys {
            JoinKeys {
                key: "post_id".to_string(),
                foreign_key: "id".to_string(),
            }
        }
    }

    #[test]
    fn strategies_agree() {
        let stock =
            AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id"))
                .unwrap();
        let host = AssociationDescriptor::new(
            "comments",
            "comment",
            HostReflection {
                kind: RelationKind::HasMany,
            },
        )
        .unwrap();

        for descriptor in [&stock, &host] {
            let composite = JoinKeyResolver::new(JoinKeyStrategy::Composite).resolve(descriptor);
            let split = JoinKeyResolver::new(JoinKeyStrategy::Split).resolve(descriptor);
            assert_eq!(composite, split);
            assert_eq!(composite, JoinKeys::new("post_id", "id"));
        }
    }

    #[test]
    fn belongs_to_keys() {
        let descriptor =
            AssociationDescriptor::new("author", "author", Reflection::belongs_to("author_id"))
                .unwrap();
        let keys = JoinKeyResolver::default().resolve(&descriptor);
        assert_eq!(keys.key, "id");
        assert_eq!(keys.foreign_key, "author_id");
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("Split".parse::<JoinKeyStrategy>(), Ok(JoinKeyStrategy::Split));
        assert_eq!(" composite ".parse::<JoinKeyStrategy>(), Ok(JoinKeyStrategy::Composite));
        assert!("legacy".parse::<JoinKeyStrategy>().is_err());
        assert_eq!(JoinKeyStrategy::default().as_str(), "composite");
    }
}
