use atlas_types::FieldKind;
use thiserror::Error;

use crate::expr::Param;

/// Errors from predicate normalization and parameter binding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// The expression has a shape the normalizer cannot express.
    #[error("unsupported predicate: {0}")]
    NotSupported(String),

    /// A member refers to a field the document type does not declare.
    #[error("document {document} has no field {field}")]
    UnknownField { document: String, field: String },

    /// A constant or second member cannot be compared with a field.
    #[error("field {field} is {expected}, cannot compare with {found}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        found: String,
    },

    /// A member refers to a parameter no clause binds.
    #[error("expression references unbound parameter {0}")]
    UnboundParameter(Param),
}

/// Result alias for predicate operations.
pub type PredicateResult<T> = Result<T, PredicateError>;
