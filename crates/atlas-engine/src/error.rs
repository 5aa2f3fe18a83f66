use std::time::Duration;

use atlas_query::PredicateError;
use atlas_store::StoreError;
use atlas_types::{SchemaError, TypeError};

use crate::relation::Cardinality;

/// Errors reported by a backing-store adapter.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The backing store cannot be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The backing store rejected or failed the request.
    #[error("source query failed: {0}")]
    Query(String),

    /// The predicate cannot be expressed in the backing store's language.
    #[error("predicate cannot be translated: {0}")]
    Untranslatable(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result alias for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors from building and querying an [`crate::Atlas`].
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// The document type was never registered with the builder.
    #[error("document type {0} is not registered")]
    UnknownDocument(&'static str),

    #[error("document {0} is registered more than once")]
    DuplicateDocument(String),

    #[error("document {0} has no source")]
    MissingSource(String),

    /// Preload was requested for a source whose records must not be cached.
    #[error("document {0} cannot be preloaded: its source does not allow caching")]
    PreloadNotSupported(String),

    /// The backing store failed; never retried.
    #[error("source for {document} failed: {source}")]
    Source {
        document: String,
        #[source]
        source: SourceError,
    },

    #[error("source for {document} did not answer within {timeout:?}")]
    SourceTimeout { document: String, timeout: Duration },

    #[error("document {document} has no relation named {relation}")]
    UnknownRelation { document: String, relation: String },

    #[error("document {document} declares relation {relation} more than once")]
    DuplicateRelation { document: String, relation: String },

    #[error("relation {document}.{relation} targets {actual}, not {requested}")]
    RelationType {
        document: String,
        relation: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("relation {document}.{relation} targets unregistered document {target}")]
    UnregisteredTarget {
        document: String,
        relation: String,
        target: &'static str,
    },

    #[error("relation {document}.{relation} is {actual:?}, not {requested:?}")]
    Cardinality {
        document: String,
        relation: String,
        actual: Cardinality,
        requested: Cardinality,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("atlas has been disposed")]
    Disposed,
}

/// Result alias for Atlas operations.
pub type AtlasResult<T> = Result<T, AtlasError>;
