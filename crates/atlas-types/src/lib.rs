//! Foundation types for Atlas, the typed document cache.
//!
//! This crate provides the value, schema, and identity types used throughout
//! the Atlas workspace. Every other Atlas crate depends on `atlas-types`.
//!
//! # Key Types
//!
//! - [`Value`] -- Dynamically typed field value exchanged with predicates and indexes
//! - [`FieldKind`] -- Declared type of a schema field
//! - [`Schema`] -- Named field list with the subset marked as key fields
//! - [`Document`] -- Trait every cached document type implements
//! - [`KeyHash`] -- Order-stable BLAKE3 hash over a document's key fields

pub mod document;
pub mod error;
pub mod key;
pub mod schema;
pub mod value;

pub use document::{Document, FromValue};
pub use error::{SchemaError, TypeError};
pub use key::KeyHash;
pub use schema::{FieldDef, Schema, SchemaBuilder};
pub use value::{FieldKind, Value};
