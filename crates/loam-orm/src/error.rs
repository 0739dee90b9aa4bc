//! Error types for the ORM.

use thiserror::Error;

/// ORM-specific errors.
///
/// Construction errors (`MultipleWhereClauses`, `UnknownField`, ...) are
/// raised before any statement is issued. Store errors propagate unchanged;
/// nothing in this crate retries or rolls back.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Opening or closing a database connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// The store rejected a statement.
    #[error("statement error: {0}")]
    Statement(#[source] sqlx::Error),

    /// Query construction error from the expression layer.
    #[error(transparent)]
    Query(#[from] loam_sql::QueryError),

    /// An entity declaration is invalid.
    #[error("schema error: {0}")]
    Schema(String),

    /// A string-named entity reference has no registered target.
    #[error("entity '{0}' is not registered")]
    UnresolvedEntityReference(String),

    /// A field name does not exist on the entity.
    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField {
        /// The entity that was addressed.
        entity: String,
        /// The missing field name.
        field: String,
    },

    /// A value does not match the declared kind of a field.
    #[error("value does not match the declared kind of '{entity}.{field}'")]
    TypeMismatch {
        /// The entity that was addressed.
        entity: String,
        /// The mismatched field name.
        field: String,
    },

    /// A related instance must be saved before it can be linked.
    #[error("related '{0}' instance has not been saved yet")]
    UnsavedReference(String),

    /// A query builder can carry only one WHERE clause.
    #[error("only one WHERE clause is allowed per query")]
    MultipleWhereClauses,

    /// A query builder can carry only one LIMIT clause.
    #[error("only one LIMIT clause is allowed per query")]
    MultipleLimitClauses,
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
