//! `StorageError` — the typed wrapper every repository returns, per
//! spec.md §4.1's "Failure semantics".

use spine_contracts::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("operation timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unknown storage error: {0}")]
    Unknown(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StorageError::NotFound => ErrorCategory::NotFound,
            StorageError::Constraint(_) => ErrorCategory::Conflict,
            StorageError::Timeout => ErrorCategory::Timeout,
            StorageError::Connection(_) => ErrorCategory::RuntimeUnavailable,
            StorageError::Unknown(_) => ErrorCategory::Internal,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                    StorageError::Constraint(db_err.message().to_string())
                } else {
                    StorageError::Unknown(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => StorageError::Timeout,
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => StorageError::Connection(err.to_string()),
            other => StorageError::Unknown(other.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
