//! Render environment passed down a traversal.

use crate::blueprint::AssociationOptions;
use crate::extractor::AssociationExtractor;
use crate::store::RecordStore;
use assocload_core::{Record, Result};
use assocload_loader::{BatchRegistry, Output};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied options visible to computed fields and scope functions.
pub type LocalOptions = serde_json::Map<String, serde_json::Value>;

/// The owned part of a render context.
///
/// Cheap to clone; batch functions capture a clone so renders they perform
/// see the same store, extractor and options as the traversal that
/// registered them.
#[derive(Clone)]
pub struct RenderEnv {
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn AssociationExtractor>,
    local_options: Arc<LocalOptions>,
}

impl RenderEnv {
    pub fn new(store: Arc<dyn RecordStore>, extractor: Arc<dyn AssociationExtractor>) -> Self {
        Self {
            store,
            extractor,
            local_options: Arc::new(LocalOptions::new()),
        }
    }

    #[must_use]
    pub fn with_local_options(mut self, local_options: LocalOptions) -> Self {
        self.local_options = Arc::new(local_options);
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn extractor(&self) -> &dyn AssociationExtractor {
        self.extractor.as_ref()
    }

    pub fn local_options(&self) -> &LocalOptions {
        &self.local_options
    }
}

impl fmt::Debug for RenderEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEnv")
            .field("local_options", &self.local_options)
            .finish_non_exhaustive()
    }
}

/// A render environment bound to the registry of the current traversal.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    env: &'a RenderEnv,
    registry: &'a BatchRegistry,
}

impl<'a> RenderContext<'a> {
    pub fn new(env: &'a RenderEnv, registry: &'a BatchRegistry) -> Self {
        Self { env, registry }
    }

    pub fn env(&self) -> &'a RenderEnv {
        self.env
    }

    pub fn registry(&self) -> &'a BatchRegistry {
        self.registry
    }

    pub fn store(&self) -> &'a dyn RecordStore {
        self.env.store()
    }

    pub fn local_options(&self) -> &'a LocalOptions {
        self.env.local_options()
    }

    /// Extract `association` of `parent` with the configured extractor.
    pub fn extract(&self, association: &AssociationOptions, parent: &Record) -> Result<Output> {
        self.env.extractor().extract(association, parent, self)
    }
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("env", self.env)
            .field("registry", self.registry)
            .finish()
    }
}
