//! Deferred batch resolution for assocload.
//!
//! Callers register requests against a [`BatchRegistry`] and get
//! [`Deferred`] placeholders back. Requests with equal [`BatchKey`]s share one
//! pending batch; forcing any of its placeholders runs the batch function
//! once with every item key collected so far.
//!
//! ```
//! use assocload_core::{Result, Value};
//! use assocload_loader::{BatchKey, BatchRegistry, BatchWriter, Output};
//! use serde_json::json;
//!
//! let registry = BatchRegistry::new();
//! let key = BatchKey::new("author", "author");
//! let lookup = |items: &[Value], writer: &mut BatchWriter, _: &BatchRegistry| -> Result<()> {
//!     for item in items {
//!         writer.set(item.clone(), json!({ "id": item.to_json() }));
//!     }
//!     Ok(())
//! };
//!
//! let a = registry.get_or_create(key.clone(), Value::BigInt(1), Output::null(), lookup);
//! let b = registry.get_or_create(key, Value::BigInt(2), Output::null(), lookup);
//! assert_eq!(registry.len(), 1);
//!
//! let tree = Output::List(vec![a.into(), b.into()]);
//! let json = registry.materialize(&tree).unwrap();
//! assert_eq!(json, json!([{ "id": 1 }, { "id": 2 }]));
//! assert_eq!(registry.stats().batches_resolved, 1);
//! ```

pub mod config;
pub mod deferred;
pub mod output;
pub mod registry;
pub mod tracker;

pub use config::{DEFAULT_DEGRADED_THRESHOLD, DEFAULT_MAX_FORCE_DEPTH, LoaderConfig};
pub use deferred::{BatchFn, BatchWriter, Deferred};
pub use output::{Output, force_output};
pub use registry::{BatchKey, BatchRegistry, PendingBatch};
pub use tracker::{BatchOpen, BatchStats, BatchTracker};
