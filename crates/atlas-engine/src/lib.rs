//! Typed in-process document cache for Atlas.
//!
//! An [`Atlas`] mirrors document types from their backing stores. Reads are
//! answered from memory when the cache can prove it holds the answer (a
//! fully pinned key, or a preloaded type) and from the type's [`Source`]
//! otherwise; source results are written back into the cache.
//!
//! # Key Types
//!
//! - [`Atlas`] -- the cache context, built once by [`AtlasBuilder`]
//! - [`DocumentBuilder`] -- per-type registration: source, indexes, relations
//! - [`QueryContext`] -- per-call memo shared by every relation a read visits
//! - [`Entity`] / [`Documents`] -- read results that can navigate relations
//! - [`Source`] / [`SourceRecord`] -- adapter to the backing store
//! - [`Change`] -- change-feed message applied with [`Atlas::apply_change`]
//!
//! # Read Rules
//!
//! 1. A read normalizes its query and consults the context memo first; a
//!    repeated predicate returns the same set.
//! 2. Unless the read bypasses the cache, a predicate pinning every key field
//!    is answered by direct lookup, with the rest of the predicate re-checked.
//! 3. `OnlyCache` reads, and `Default` reads of a preloaded type, are answered
//!    from memory.
//! 4. Everything else asks the source. Cacheable records are upserted;
//!    transient ones evict any cached copy. All records are returned.
//! 5. Source errors and timeouts fail the read; nothing is retried.

pub mod atlas;
pub mod builder;
mod collection;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod feed;
pub mod flags;
pub mod memory;
pub mod relation;
pub mod source;

pub use atlas::Atlas;
pub use builder::{AtlasBuilder, DocumentBuilder};
pub use config::AtlasConfig;
pub use context::{DocumentSet, QueryContext};
pub use entity::{Documents, Entity, Related};
pub use error::{AtlasError, AtlasResult, SourceError, SourceResult};
pub use feed::Change;
pub use flags::{CacheFlag, ExecutionFlags, QueryOptions};
pub use memory::InMemorySource;
pub use relation::{Cardinality, Relation};
pub use source::{Source, SourceRecord};

// Re-export the types every caller needs
pub use atlas_query::{field, foreign, local, Expr, Query};
pub use atlas_store::{DocumentEvent, EventKind, SubscriptionId, Upsert};
pub use atlas_types::{Document, FieldKind, FromValue, Schema, SchemaBuilder, TypeError, Value};
