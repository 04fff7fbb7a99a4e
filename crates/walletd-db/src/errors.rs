use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::fmt::Display;
use thiserror::Error;

/// Unified database error with the operation that produced it.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to get connection from pool for '{operation}': {message}")]
    Pool { operation: String, message: String },

    #[error("database interaction failed for '{operation}': {message}")]
    Interact { operation: String, message: String },

    #[error("record not found in '{operation}'")]
    NotFound { operation: String },

    #[error("unique constraint violated in '{operation}': {message}")]
    UniqueViolation { operation: String, message: String },

    #[error("query failed in '{operation}': {message}")]
    Query { operation: String, message: String },
}

impl DatabaseError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Unique-constraint races (concurrent backfill, overlapping scans) are
    /// expected and the caller usually skips the row.
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Attach the operation context lost at the diesel layer.
    pub fn with_operation(self, operation: impl Display) -> Self {
        let operation = operation.to_string();
        match self {
            Self::Pool { message, .. } => Self::Pool { operation, message },
            Self::Interact { message, .. } => Self::Interact { operation, message },
            Self::NotFound { .. } => Self::NotFound { operation },
            Self::UniqueViolation { message, .. } => Self::UniqueViolation { operation, message },
            Self::Query { message, .. } => Self::Query { operation, message },
        }
    }
}

impl From<DieselError> for DatabaseError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound {
                operation: "unknown".to_string(),
            },
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::UniqueViolation {
                    operation: "unknown".to_string(),
                    message: info.message().to_string(),
                }
            }
            other => Self::Query {
                operation: "unknown".to_string(),
                message: other.to_string(),
            },
        }
    }
}
