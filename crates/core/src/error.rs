//! Error types for the rill query engine.

use crate::types::DataType;
use alloc::string::String;
use core::fmt;

/// Result type alias for rill operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for query validation and execution.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Structurally invalid plan, detected at validation time.
    QuerySemantic {
        message: String,
    },
    /// A scalar subquery produced more than one row.
    TooManyValues {
        rows: usize,
    },
    /// Incompatible operand types during expression evaluation.
    TypeMismatch {
        expected: DataType,
        got: Option<DataType>,
    },
    /// An expression referenced a field the current row does not carry.
    UnknownField {
        name: String,
    },
    /// A plan referenced a source binding that was not supplied.
    UnknownBinding {
        alias: String,
    },
    /// Parallel work was submitted after the worker pool shut down.
    PoolShutdown,
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QuerySemantic { message } => {
                write!(f, "Invalid query plan: {}", message)
            }
            Error::TooManyValues { rows } => {
                write!(f, "Scalar subquery produced {} rows, expected at most one", rows)
            }
            Error::TypeMismatch { expected, got } => match got {
                Some(got) => write!(f, "Type mismatch: expected {}, got {}", expected, got),
                None => write!(f, "Type mismatch: expected {}, got null", expected),
            },
            Error::UnknownField { name } => {
                write!(f, "Unknown field: {}", name)
            }
            Error::UnknownBinding { alias } => {
                write!(f, "No data source bound to alias: {}", alias)
            }
            Error::PoolShutdown => {
                write!(f, "Worker pool has been shut down")
            }
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

impl Error {
    /// Creates a query-semantic validation error.
    pub fn query_semantic(message: impl Into<String>) -> Self {
        Error::QuerySemantic {
            message: message.into(),
        }
    }

    /// Creates a too-many-values error.
    pub fn too_many_values(rows: usize) -> Self {
        Error::TooManyValues { rows }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: Option<DataType>) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Error::UnknownField { name: name.into() }
    }

    /// Creates an unknown binding error.
    pub fn unknown_binding(alias: impl Into<String>) -> Self {
        Error::UnknownBinding {
            alias: alias.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error was raised at plan-validation time.
    pub fn is_semantic(&self) -> bool {
        matches!(self, Error::QuerySemantic { .. })
    }
}
