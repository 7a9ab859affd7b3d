//! Association metadata.
//!
//! An association is described once, when a blueprint is defined, and then
//! read by the join-key resolver and the extraction policy for every parent
//! record rendered through it. The relation metadata itself sits behind the
//! `RelationMetadata` trait so hosts can back it with their own reflection
//! data; `Reflection` is the stock implementation.

use crate::error::{ConfigErrorKind, Error, Result};
use crate::join_keys::JoinKeys;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Primary key attribute assumed when a reflection does not name one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// The kind of relation between a parent record and its associated records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// One-to-one, foreign key on the child: `Post` has one `Summary`.
    HasOne,
    /// One-to-many, foreign key on the child: `Post` has many `Comment`s.
    HasMany,
    /// Owning reference, foreign key on the parent: `Post` belongs to `Author`.
    BelongsTo,
    /// Many-to-many via a link table. Not batched; loaded per parent.
    HasManyThrough(LinkTable),
    /// A relation the batch policy cannot express, named for error reporting.
    Unsupported(String),
}

impl RelationKind {
    /// Does this relation render as a list?
    pub const fn is_collection(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasManyThrough(_))
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasManyThrough(_) => "has_many_through",
            RelationKind::Unsupported(name) => name,
        }
    }
}

/// Link table for many-to-many relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTable {
    /// The link record kind (e.g. `"post_tags"`).
    pub kind: String,
    /// Attribute in the link table pointing to the parent (e.g. `"post_id"`).
    pub local_column: String,
    /// Attribute in the link table pointing to the target (e.g. `"tag_id"`).
    pub remote_column: String,
}

impl LinkTable {
    pub fn new(
        kind: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        }
    }
}

/// Source of relation metadata for one association.
///
/// `join_keys` is the composite accessor; `join_primary_key` and
/// `join_foreign_key` are the split accessors. Implementations must keep the
/// two views consistent.
pub trait RelationMetadata: fmt::Debug + Send + Sync {
    /// The relation kind tag.
    fn kind(&self) -> &RelationKind;

    /// Attribute on the associated (target) record used in the bulk lookup.
    fn join_primary_key(&self) -> &str;

    /// Attribute on the parent record holding the item key.
    fn join_foreign_key(&self) -> &str;

    /// Both join attributes at once.
    fn join_keys(&self) -> JoinKeys {
        JoinKeys::new(self.join_primary_key(), self.join_foreign_key())
    }
}

/// Stock relation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    kind: RelationKind,
    key: String,
    foreign_key: String,
}

impl Reflection {
    /// `has_one`: the target carries `foreign_key` pointing at the parent's `id`.
    pub fn has_one(foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasOne,
            key: foreign_key.into(),
            foreign_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// `has_many`: the targets carry `foreign_key` pointing at the parent's `id`.
    pub fn has_many(foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            key: foreign_key.into(),
            foreign_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// `belongs_to`: the parent carries `foreign_key` pointing at the target's `id`.
    pub fn belongs_to(foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            key: DEFAULT_PRIMARY_KEY.to_string(),
            foreign_key: foreign_key.into(),
        }
    }

    /// Many-to-many through `link`.
    pub fn has_many_through(link: LinkTable) -> Self {
        Self {
            kind: RelationKind::HasManyThrough(link),
            key: DEFAULT_PRIMARY_KEY.to_string(),
            foreign_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// A relation kind the policy does not support.
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::Unsupported(kind.into()),
            key: DEFAULT_PRIMARY_KEY.to_string(),
            foreign_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// Override the primary key side of the join.
    ///
    /// For `has_one`/`has_many` this is the parent attribute, for `belongs_to`
    /// and `has_many_through` the target attribute.
    #[must_use]
    pub fn primary_key(mut self, pk: impl Into<String>) -> Self {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => self.foreign_key = pk.into(),
            _ => self.key = pk.into(),
        }
        self
    }
}

impl RelationMetadata for Reflection {
    fn kind(&self) -> &RelationKind {
        &self.kind
    }

    fn join_primary_key(&self) -> &str {
        &self.key
    }

    fn join_foreign_key(&self) -> &str {
        &self.foreign_key
    }
}

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Check that `name` is a plain identifier.
pub fn validate_identifier(what: &str, name: &str) -> Result<()> {
    if identifier_regex().is_match(name) {
        Ok(())
    } else {
        Err(Error::config(
            ConfigErrorKind::InvalidName,
            format!("{what} '{name}' is not a valid identifier"),
        ))
    }
}

/// Immutable description of one association.
#[derive(Debug, Clone)]
pub struct AssociationDescriptor {
    name: String,
    target: String,
    metadata: Arc<dyn RelationMetadata>,
}

impl AssociationDescriptor {
    /// Describe association `name` pointing at records of kind `target`.
    ///
    /// Names and join attributes must be identifiers.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        metadata: impl RelationMetadata + 'static,
    ) -> Result<Self> {
        let name = name.into();
        let target = target.into();
        validate_identifier("association", &name)?;
        validate_identifier("record kind", &target)?;
        validate_identifier("join attribute", metadata.join_primary_key())?;
        validate_identifier("join attribute", metadata.join_foreign_key())?;
        if let RelationKind::HasManyThrough(link) = metadata.kind() {
            validate_identifier("link table", &link.kind)?;
            validate_identifier("link attribute", &link.local_column)?;
            validate_identifier("link attribute", &link.remote_column)?;
        }
        Ok(Self {
            name,
            target,
            metadata: Arc::new(metadata),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record kind of the associated records.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> &RelationKind {
        self.metadata.kind()
    }

    pub fn metadata(&self) -> &dyn RelationMetadata {
        self.metadata.as_ref()
    }
}
