//! Error types for query construction.

use thiserror::Error;

/// Errors raised while building query components.
///
/// All of these are construction-time errors: they are reported before any
/// statement text leaves the crate, and none of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// An operand is not usable with the given operator.
    #[error("invalid operand for '{operator}'")]
    InvalidOperand {
        /// The SQL operator that rejected the operand.
        operator: &'static str,
    },

    /// A projection mixes columns from more than one table.
    #[error("all projected columns must belong to the same table")]
    MixedEntityProjection,

    /// An empty projection was given without an explicit table.
    #[error("a query needs either a table or a non-empty projection")]
    UnresolvableEntityType,
}

/// Result type alias for query construction.
pub type Result<T> = std::result::Result<T, QueryError>;
