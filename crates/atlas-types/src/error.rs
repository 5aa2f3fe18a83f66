use thiserror::Error;

use crate::value::FieldKind;

/// Errors produced by value conversions and document field access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: FieldKind, found: String },

    #[error("value {value} cannot be represented as {kind}")]
    OutOfRange { value: String, kind: FieldKind },

    #[error("null assigned to non-nullable field")]
    NullNotAllowed,

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid {kind} literal: {reason}")]
    Parse { kind: FieldKind, reason: String },
}

/// Errors produced while building or validating a document schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema name must not be empty")]
    EmptyName,

    #[error("document {document} declares no key field")]
    MissingKey { document: String },

    #[error("document {document} declares field {field} more than once")]
    DuplicateField { document: String, field: String },

    #[error("document {document} declares key field {field} as nullable")]
    NullableKey { document: String, field: String },

    #[error("document {document} declares a field with an empty name")]
    EmptyField { document: String },
}
