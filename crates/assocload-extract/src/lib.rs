//! Association extraction for assocload.
//!
//! Renders records through blueprints and loads their associations through
//! a pluggable extractor:
//!
//! - `BatchExtractor` registers one deferred lookup per association read;
//!   reads sharing a batch key share one store query
//! - `ImmediateExtractor` queries the store once per parent
//! - `Serializer` drives a whole traversal with a fresh registry per call

pub mod blueprint;
pub mod config;
pub mod context;
pub mod extractor;
pub mod serializer;
pub mod store;

pub use blueprint::{
    AssociationOptions, Blueprint, BlueprintRef, DEFAULT_VIEW, FieldFn, Renderer, RendererSelector,
    ScopeFn, View,
};
pub use config::SerializerConfig;
pub use context::{LocalOptions, RenderContext, RenderEnv};
pub use extractor::{AssociationExtractor, BatchExtractor, ImmediateExtractor, default_output};
pub use serializer::Serializer;
pub use store::{MemoryStore, RecordStore};
