//! Error types for assocload operations.

use std::fmt;

/// The primary error type for all assocload operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid association or renderer configuration, raised before any
    /// batch is registered
    Config(ConfigError),
    /// A batch group failed to resolve
    Resolution(ResolutionError),
    /// The record store failed to answer a lookup
    Store(StoreError),
    /// Attribute type conversion errors
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Relation kind the batch policy cannot express
    UnsupportedRelation,
    /// Renderer chosen per record, so it cannot be fingerprinted
    DynamicRenderer,
    /// View not defined on the renderer
    UnknownView,
    /// Record lacks the join attribute
    MissingAttribute,
    /// Association or attribute name is not an identifier
    InvalidName,
    /// Malformed configuration value
    InvalidSetting,
}

#[derive(Debug)]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    /// Label of the batch group involved, if any
    pub batch: Option<String>,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// The batch function returned an error
    BatchFailed,
    /// The batch already failed earlier in this scope
    AlreadyFailed,
    /// A batch was forced from inside its own batch function
    Cycle,
    /// Nested deferred values went deeper than the configured bound
    DepthExceeded,
    /// The registry owning the batch was dropped
    ScopeDropped,
    /// The deferred value was forced through a registry that does not own it
    ForeignScope,
    /// `append` on an item whose default is not a list
    InvalidAppend,
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Record kind is not known to the store
    UnknownKind,
    /// Lookup failed inside the store
    Query,
    /// Store is unavailable
    Unavailable,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub attribute: Option<String>,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl ResolutionError {
    pub fn new(kind: ResolutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            batch: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the label of the batch group involved.
    #[must_use]
    pub fn batch(mut self, label: impl Into<String>) -> Self {
        self.batch = Some(label.into());
        self
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError::new(kind, message))
    }

    /// Shorthand for a resolution error without a source.
    pub fn resolution(kind: ResolutionErrorKind, message: impl Into<String>) -> Self {
        Error::Resolution(ResolutionError::new(kind, message))
    }

    /// Is this a configuration error (raised before any batch was registered)?
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Is this a batch resolution error?
    pub fn is_resolution(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    /// Get the configuration error kind, if this is one.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the resolution error kind, if this is one.
    pub fn resolution_kind(&self) -> Option<ResolutionErrorKind> {
        match self {
            Error::Resolution(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Walk `BatchFailed` wrappers down to the error the batch function raised.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Resolution(ResolutionError {
                source: Some(inner),
                ..
            }) => inner.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Resolution(e) => write!(f, "Batch resolution error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Resolution(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(batch) = &self.batch {
            write!(f, "{} (batch {})", self.message, batch)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(attr) = &self.attribute {
            write!(
                f,
                "expected {} for attribute '{}', found {}",
                self.expected, attr, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ResolutionError> for Error {
    fn from(err: ResolutionError) -> Self {
        Error::Resolution(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for assocload operations.
pub type Result<T> = std::result::Result<T, Error>;
