//! Top-level traversal.
//!
//! Each call renders its records into an output tree with a fresh registry,
//! then forces the tree. Associations of all records in the call, and of all
//! their nested records, are loaded in one lookup per association and level.

use crate::blueprint::Renderer;
use crate::config::SerializerConfig;
use crate::context::{LocalOptions, RenderContext, RenderEnv};
use crate::extractor::{AssociationExtractor, BatchExtractor, ImmediateExtractor};
use crate::store::RecordStore;
use assocload_core::{ConfigErrorKind, Error, Record, Result};
use assocload_loader::{BatchRegistry, Output};
use std::sync::Arc;

/// Renders records through renderers against a record store.
#[derive(Clone)]
pub struct Serializer {
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn AssociationExtractor>,
    config: SerializerConfig,
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Serializer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, SerializerConfig::default())
    }

    /// Create a serializer; `config.batching` picks the extractor.
    pub fn with_config(store: Arc<dyn RecordStore>, config: SerializerConfig) -> Self {
        let extractor: Arc<dyn AssociationExtractor> = if config.batching {
            Arc::new(BatchExtractor::new(config.join_keys))
        } else {
            Arc::new(ImmediateExtractor::new(config.join_keys))
        };
        Self {
            store,
            extractor,
            config,
        }
    }

    /// Replace the association extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn AssociationExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Render one record in `view`.
    #[tracing::instrument(
        level = "debug",
        skip(self, renderer, record, local_options),
        fields(renderer = renderer.fingerprint().unwrap_or("?"), kind = record.kind())
    )]
    pub fn render(
        &self,
        renderer: &dyn Renderer,
        record: &Record,
        view: &str,
        local_options: LocalOptions,
    ) -> Result<serde_json::Value> {
        self.run(renderer, view, local_options, |ctx| {
            renderer.render(record, view, ctx)
        })
    }

    /// Render a list of records in `view`, preserving their order.
    #[tracing::instrument(
        level = "debug",
        skip(self, renderer, records, local_options),
        fields(renderer = renderer.fingerprint().unwrap_or("?"), count = records.len())
    )]
    pub fn render_many(
        &self,
        renderer: &dyn Renderer,
        records: &[Record],
        view: &str,
        local_options: LocalOptions,
    ) -> Result<serde_json::Value> {
        self.run(renderer, view, local_options, |ctx| {
            records
                .iter()
                .map(|record| renderer.render(record, view, ctx))
                .collect::<Result<Vec<_>>>()
                .map(Output::List)
        })
    }

    fn run(
        &self,
        renderer: &dyn Renderer,
        view: &str,
        local_options: LocalOptions,
        build: impl FnOnce(&RenderContext<'_>) -> Result<Output>,
    ) -> Result<serde_json::Value> {
        if !renderer.has_view(view) {
            return Err(Error::config(
                ConfigErrorKind::UnknownView,
                format!("{} has no view '{view}'", renderer.fingerprint().unwrap_or("renderer")),
            ));
        }

        let registry = BatchRegistry::with_config(self.config.loader.clone());
        let env = RenderEnv::new(Arc::clone(&self.store), Arc::clone(&self.extractor))
            .with_local_options(local_options);
        let ctx = RenderContext::new(&env, &registry);

        let tree = build(&ctx)?;
        let json = registry.materialize(&tree)?;

        let stats = registry.stats();
        tracing::info!(
            batches = stats.batches_opened,
            resolved = stats.batches_resolved,
            failed = stats.batches_failed,
            items = stats.items_resolved,
            reopened = stats.reopened,
            nested = stats.nested,
            "serialization complete"
        );
        Ok(json)
    }
}
