//! assocload: N+1-free association serialization.
//!
//! Rendering a list of records together with their associations naively
//! costs one query per record per association. assocload renders through
//! blueprints whose associations come back as deferred values; every deferred
//! value that shares a batch key is answered by one bulk lookup, run the
//! first time any of them is forced.
//!
//! # Quick Start
//!
//! ```
//! use assocload::prelude::*;
//! use assocload::serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert(Record::new("comment", [("id", Value::from(1)), ("post_id", Value::from(1))]));
//! store.insert(Record::new("comment", [("id", Value::from(2)), ("post_id", Value::from(2))]));
//!
//! let comments = AssociationDescriptor::new("comments", "comment", Reflection::has_many("post_id"))?;
//! let posts = Blueprint::new("PostBlueprint")
//!     .identifier("id")
//!     .association(AssociationOptions::new(comments, Blueprint::new("CommentBlueprint").identifier("id")));
//!
//! let records: Vec<Record> = (1..=2).map(|id| Record::new("post", [("id", Value::from(id))])).collect();
//! let json = Serializer::new(store.clone()).render_many(&posts, &records, "default", LocalOptions::new())?;
//!
//! assert_eq!(json, json!([
//!     { "id": 1, "comments": [{ "id": 1 }] },
//!     { "id": 2, "comments": [{ "id": 2 }] },
//! ]));
//! assert_eq!(store.query_count(), 1);
//! # Ok::<(), assocload::Error>(())
//! ```
//!
//! # Crates
//!
//! - `assocload-core`: values, records, errors, association metadata, join keys, scopes
//! - `assocload-loader`: batch registry, deferred values, forcing
//! - `assocload-extract`: extraction policies, record stores, blueprints, serializer

pub use assocload_core::{
    AssociationDescriptor, AttributeInfo, ConfigError, ConfigErrorKind, DEFAULT_PRIMARY_KEY, Error,
    Filter, JoinKeyResolver, JoinKeyStrategy, JoinKeys, LinkTable, OrderBy, Record, Reflection,
    RelationKind, RelationMetadata, ResolutionError, ResolutionErrorKind, Result, Scope, StoreError,
    StoreErrorKind, TypeError, Value, validate_identifier,
};
pub use assocload_extract::{
    AssociationExtractor, AssociationOptions, BatchExtractor, Blueprint, BlueprintRef, DEFAULT_VIEW,
    FieldFn, ImmediateExtractor, LocalOptions, MemoryStore, RecordStore, RenderContext, RenderEnv,
    Renderer, RendererSelector, ScopeFn, Serializer, SerializerConfig, View, default_output,
};
pub use assocload_loader::{
    BatchFn, BatchKey, BatchOpen, BatchRegistry, BatchStats, BatchTracker, BatchWriter, Deferred,
    LoaderConfig, Output, force_output,
};

pub use serde_json;

/// Prelude for the common case: describing associations, defining
/// blueprints and serializing through a store.
///
/// ```
/// use assocload::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AssociationDescriptor, AssociationOptions, BatchKey, BatchRegistry, Blueprint,
        BlueprintRef, Error, JoinKeyStrategy, LinkTable, LocalOptions, MemoryStore, Output,
        Record, RecordStore, Reflection, Renderer, Result, Scope, Serializer, SerializerConfig,
        Value,
    };
}
