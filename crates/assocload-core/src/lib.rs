//! Core types for assocload.
//!
//! This crate provides the foundational pieces shared by the loader and the
//! extraction policy:
//!
//! - `Value` for attribute values and batch item keys
//! - `Record` for records returned by a record store
//! - `Error` and `Result` for every fallible operation
//! - Association metadata (`AssociationDescriptor`, `RelationKind`)
//! - Join-key resolution (`JoinKeyResolver`)
//! - `Scope` filters narrowing a bulk lookup

pub mod error;
pub mod join_keys;
pub mod record;
pub mod relationship;
pub mod scope;
pub mod value;

pub use error::{
    ConfigError, ConfigErrorKind, Error, ResolutionError, ResolutionErrorKind, Result, StoreError,
    StoreErrorKind, TypeError,
};
pub use join_keys::{JoinKeyResolver, JoinKeyStrategy, JoinKeys};
pub use record::{AttributeInfo, Record};
pub use relationship::{
    AssociationDescriptor, DEFAULT_PRIMARY_KEY, LinkTable, Reflection, RelationKind,
    RelationMetadata, validate_identifier,
};
pub use scope::{Filter, OrderBy, Scope};
pub use value::Value;
