//! Error taxonomy for the storage engine.
//!
//! Every fallible operation returns a tagged [`StoreError`] rather than a bare
//! `rusqlite::Error` so callers can branch on the semantic kind (missing schema,
//! corrupt embedding, FK violation, ...) without parsing SQLite's message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt embedding blob ({len} bytes is not a multiple of 4): {context}")]
    CorruptEmbedding { len: usize, context: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid stored {entity} value: {value}")]
    InvalidEnumValue { entity: &'static str, value: String },

    #[error("invalid lexical query: {0}")]
    InvalidQuery(String),

    #[error("schema not initialized")]
    SchemaMissing,

    #[error("schema version {found} is not supported (expected {expected})")]
    SchemaVersionUnsupported { found: String, expected: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("foreign key violation writing {entity} {id}: {source}")]
    ForeignKeyViolation {
        entity: &'static str,
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unique constraint violation writing {entity} {id}: {source}")]
    UniqueViolation {
        entity: &'static str,
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Classifies a raw `rusqlite::Error` from a writer call into the taxonomy above,
/// attaching the entity kind and identifier for triage.
pub(crate) fn classify_write_error(err: rusqlite::Error, entity: &'static str, id: impl Into<String>) -> StoreError {
    use rusqlite::ffi::ErrorCode;
    let id = id.into();
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
        match ffi_err.code {
            ErrorCode::ConstraintViolation => {
                let msg = err.to_string();
                if msg.contains("FOREIGN KEY") {
                    return StoreError::ForeignKeyViolation { entity, id, source: err };
                }
                if msg.contains("UNIQUE") || msg.contains("PRIMARY KEY") {
                    return StoreError::UniqueViolation { entity, id, source: err };
                }
            }
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return StoreError::TransactionConflict(err.to_string());
            }
            _ => {}
        }
    }
    StoreError::Sqlite(err)
}
