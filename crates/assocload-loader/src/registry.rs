//! The batch registry.
//!
//! A registry is scoped to one traversal. Requests registered under equal
//! `BatchKey`s join the same open batch; the batch function runs once, on
//! the first force of any of its deferred values, with every distinct item
//! key collected so far.
//!
//! Locking: the registry lock is always taken before a batch lock, and no
//! lock is held while a batch function runs. A thread forcing a batch that
//! another thread is resolving waits for it; the resolving thread forcing
//! its own batch gets a `Cycle` error instead of deadlocking.

use crate::config::LoaderConfig;
use crate::deferred::{BatchFn, BatchWriter, Deferred};
use crate::output::{Output, force_output};
use crate::tracker::{BatchOpen, BatchStats, BatchTracker};
use assocload_core::{JoinKeys, ResolutionError, ResolutionErrorKind, Result, Scope, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Instant;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a batch group.
///
/// Two requests coalesce exactly when their keys are equal. The key carries
/// everything the batch function depends on besides the item keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Association name
    pub association: String,
    /// Target record kind
    pub target: String,
    /// View rendered for each target
    pub view: String,
    /// Fingerprint of the renderer, if the batch renders records
    pub renderer: Option<String>,
    /// Attribute pair the lookup joins on, if the batch reads a store
    pub join: Option<JoinKeys>,
    /// Extra filters and ordering for the lookup
    pub scope: Scope,
}

impl BatchKey {
    pub fn new(association: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            association: association.into(),
            target: target.into(),
            view: "default".to_string(),
            renderer: None,
            join: None,
            scope: Scope::default(),
        }
    }

    #[must_use]
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = view.into();
        self
    }

    #[must_use]
    pub fn renderer(mut self, fingerprint: impl Into<String>) -> Self {
        self.renderer = Some(fingerprint.into());
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinKeys) -> Self {
        self.join = Some(join);
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Short human-readable label for logs and errors.
    pub fn label(&self) -> String {
        format!("{}/{}:{}", self.association, self.target, self.view)
    }
}

enum BatchState {
    Pending {
        items: Vec<Value>,
        seen: HashSet<Value>,
        batch_fn: BatchFn,
        default: Output,
    },
    Resolving {
        thread: ThreadId,
    },
    Resolved(HashMap<Value, Output>),
    Failed(String),
}

/// One batch group: accumulates item keys until forced, then holds results.
pub struct PendingBatch {
    key: BatchKey,
    registry_id: u64,
    state: Mutex<BatchState>,
    ready: Condvar,
}

enum Step {
    Done,
    Wait,
    Run,
}

/// Outcome of adding an item to an existing batch.
enum Join {
    Added,
    Resolving,
    Settled,
}

impl PendingBatch {
    fn new(key: BatchKey, registry_id: u64, item: Value, default: Output, batch_fn: BatchFn) -> Self {
        let mut seen = HashSet::new();
        seen.insert(item.clone());
        Self {
            key,
            registry_id,
            state: Mutex::new(BatchState::Pending {
                items: vec![item],
                seen,
                batch_fn,
                default,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolved or failed.
    pub(crate) fn is_settled(&self) -> bool {
        matches!(*self.lock(), BatchState::Resolved(_) | BatchState::Failed(_))
    }

    fn is_pending(&self) -> bool {
        matches!(*self.lock(), BatchState::Pending { .. })
    }

    /// Add `item` if the batch is still pending.
    fn try_add(&self, item: &Value) -> Join {
        match &mut *self.lock() {
            BatchState::Pending { items, seen, .. } => {
                if seen.insert(item.clone()) {
                    items.push(item.clone());
                }
                Join::Added
            }
            BatchState::Resolving { .. } => Join::Resolving,
            BatchState::Resolved(_) | BatchState::Failed(_) => Join::Settled,
        }
    }

    fn pending_items(&self) -> Option<Vec<Value>> {
        match &*self.lock() {
            BatchState::Pending { items, .. } => Some(items.clone()),
            _ => None,
        }
    }

    fn finish(&self, state: BatchState) {
        let mut guard = self.lock();
        *guard = state;
        self.ready.notify_all();
    }

    fn lookup(&self, item: &Value) -> Option<Output> {
        match &*self.lock() {
            BatchState::Resolved(results) => results.get(item).cloned(),
            _ => None,
        }
    }

    /// Run the batch function if nobody has yet; wait if another thread is.
    fn resolve(&self, registry: &BatchRegistry) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.lock();
        loop {
            let step = match &*state {
                BatchState::Resolved(_) => Step::Done,
                BatchState::Failed(message) => {
                    return Err(ResolutionError::new(
                        ResolutionErrorKind::AlreadyFailed,
                        format!("batch failed earlier: {message}"),
                    )
                    .batch(self.key.label())
                    .into());
                }
                BatchState::Resolving { thread } if *thread == me => {
                    return Err(ResolutionError::new(
                        ResolutionErrorKind::Cycle,
                        "batch forced from inside its own batch function",
                    )
                    .batch(self.key.label())
                    .into());
                }
                BatchState::Resolving { .. } => Step::Wait,
                BatchState::Pending { .. } => Step::Run,
            };
            match step {
                Step::Done => return Ok(()),
                Step::Wait => {
                    state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
                }
                Step::Run => break,
            }
        }

        let (items, batch_fn, default) =
            match std::mem::replace(&mut *state, BatchState::Resolving { thread: me }) {
                BatchState::Pending {
                    items,
                    batch_fn,
                    default,
                    ..
                } => (items, batch_fn, default),
                other => {
                    *state = other;
                    return Ok(());
                }
            };
        drop(state);

        let label = self.key.label();
        tracing::debug!(
            target: "assocload::batch",
            batch = %label,
            items = items.len(),
            "resolving batch"
        );

        let mut guard = ResolveGuard {
            batch: self,
            armed: true,
        };
        let started = Instant::now();
        let mut writer = BatchWriter::new(label.clone(), default);
        let outcome = batch_fn(&items, &mut writer, registry);
        guard.armed = false;

        match outcome {
            Ok(()) => {
                self.finish(BatchState::Resolved(writer.into_results()));
                registry.record_resolution(&self.key, items.len());
                tracing::debug!(
                    target: "assocload::batch",
                    batch = %label,
                    items = items.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "batch resolved"
                );
                Ok(())
            }
            Err(err) => {
                self.finish(BatchState::Failed(err.to_string()));
                registry.record_failure();
                tracing::warn!(
                    target: "assocload::batch",
                    batch = %label,
                    error = %err,
                    "batch function failed"
                );
                Err(ResolutionError::new(
                    ResolutionErrorKind::BatchFailed,
                    "batch function failed",
                )
                .batch(label)
                .with_source(err)
                .into())
            }
        }
    }
}

/// Marks the batch failed if the batch function unwinds.
struct ResolveGuard<'a> {
    batch: &'a PendingBatch,
    armed: bool,
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.batch
                .finish(BatchState::Failed("batch function panicked".to_string()));
        }
    }
}

struct RegistryInner {
    /// Most recent batch per key; may already be resolving or resolved.
    open: HashMap<BatchKey, Arc<PendingBatch>>,
    /// Every batch of this scope, in creation order.
    batches: Vec<Arc<PendingBatch>>,
}

/// Registry of batch groups for one traversal.
///
/// Dropping the registry releases every batch; deferred values that outlive
/// it fail with `ScopeDropped` when forced.
pub struct BatchRegistry {
    id: u64,
    config: LoaderConfig,
    inner: Mutex<RegistryInner>,
    tracker: Mutex<BatchTracker>,
}

impl Default for BatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRegistry")
            .field("id", &self.id)
            .field("batches", &self.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BatchRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        let mut tracker = BatchTracker::new().with_threshold(config.degraded_threshold);
        if !config.track_batches {
            tracker.disable();
        }
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            inner: Mutex::new(RegistryInner {
                open: HashMap::new(),
                batches: Vec::new(),
            }),
            tracker: Mutex::new(tracker),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tracker(&self) -> MutexGuard<'_, BatchTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `item` under `key` and return its deferred value.
    ///
    /// If a pending batch exists for `key`, the item joins it (duplicates are
    /// kept once) and `batch_fn` is discarded. Otherwise a new batch is
    /// opened with `batch_fn` and `default`. Never runs a batch function.
    ///
    /// A batch opened while the previous one for `key` is resolving is the
    /// next nesting level; one opened after it resolved is a late reopening
    /// and counts toward the degraded-coalescing warning.
    pub fn get_or_create<F>(&self, key: BatchKey, item: Value, default: Output, batch_fn: F) -> Deferred
    where
        F: FnOnce(&[Value], &mut BatchWriter, &BatchRegistry) -> Result<()> + Send + 'static,
    {
        let mut inner = self.lock();
        let how = match inner.open.get(&key).map(|batch| (batch, batch.try_add(&item))) {
            Some((batch, Join::Added)) => {
                tracing::trace!(
                    target: "assocload::batch",
                    batch = %key.label(),
                    item = %item,
                    "item joined batch"
                );
                return Deferred::new(batch, item, default);
            }
            Some((_, Join::Resolving)) => BatchOpen::Nested,
            Some((_, Join::Settled)) => BatchOpen::Late,
            None => BatchOpen::New,
        };

        let batch = Arc::new(PendingBatch::new(
            key.clone(),
            self.id,
            item.clone(),
            default.clone(),
            Box::new(batch_fn),
        ));
        inner.batches.push(Arc::clone(&batch));
        let label = key.label();
        self.lock_tracker()
            .record_open(&key.association, &key.target, how);
        inner.open.insert(key, Arc::clone(&batch));
        drop(inner);

        match how {
            BatchOpen::Late => tracing::debug!(
                target: "assocload::batch",
                batch = %label,
                "batch already resolved; opened a new one"
            ),
            BatchOpen::Nested => tracing::debug!(
                target: "assocload::batch",
                batch = %label,
                "batch resolving; opened the next level"
            ),
            BatchOpen::New => {
                tracing::debug!(target: "assocload::batch", batch = %label, "opened batch");
            }
        }
        Deferred::new(&batch, item, default)
    }

    /// Resolve one deferred value.
    ///
    /// Runs the owning batch function if it has not run yet. Returns the
    /// output the batch recorded for the item, or the default. The result may
    /// itself contain deferred values; see `materialize`.
    pub fn force(&self, deferred: &Deferred) -> Result<Output> {
        let batch = deferred.upgrade()?;
        if batch.registry_id != self.id {
            return Err(ResolutionError::new(
                ResolutionErrorKind::ForeignScope,
                "deferred value belongs to another registry",
            )
            .batch(batch.key().label())
            .into());
        }
        batch.resolve(self)?;
        Ok(batch
            .lookup(deferred.item())
            .unwrap_or_else(|| deferred.default_output().clone()))
    }

    /// Force every deferred leaf of `output` and return plain JSON.
    pub fn materialize(&self, output: &Output) -> Result<serde_json::Value> {
        force_output(output, self)
    }

    /// Items collected so far by the pending batch for `key`, if one is open.
    pub fn pending_items(&self, key: &BatchKey) -> Option<Vec<Value>> {
        let inner = self.lock();
        inner.open.get(key).and_then(|b| b.pending_items())
    }

    /// Number of batches still waiting to be forced.
    pub fn pending_count(&self) -> usize {
        self.lock().batches.iter().filter(|b| b.is_pending()).count()
    }

    /// Number of batches opened in this scope.
    pub fn len(&self) -> usize {
        self.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().batches.is_empty()
    }

    pub fn stats(&self) -> BatchStats {
        self.lock_tracker().stats()
    }

    /// Resolved batch count for one association.
    pub fn resolutions_for(&self, association: &str, target: &str) -> usize {
        self.lock_tracker().count_for(association, target)
    }

    fn record_resolution(&self, key: &BatchKey, items: usize) {
        self.lock_tracker()
            .record_resolution(&key.association, &key.target, items);
    }

    fn record_failure(&self) {
        self.lock_tracker().record_failure();
    }
}
