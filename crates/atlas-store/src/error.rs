use atlas_types::SchemaError;

/// Errors from document store setup.
///
/// Reads and writes on a built store cannot fail; everything that can go
/// wrong is caught while the store is being declared.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document type's schema is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An index was declared on a field the schema does not have.
    #[error("document {document} has no field {field} to index")]
    UnknownIndexField { document: String, field: String },

    /// The same field was indexed twice.
    #[error("field {field} of {document} is already indexed")]
    DuplicateIndex { document: String, field: String },

    /// Indexes must exist before the first document arrives.
    #[error("cannot index {document}.{field}: store already holds {count} documents")]
    IndexAfterLoad {
        document: String,
        field: String,
        count: usize,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
