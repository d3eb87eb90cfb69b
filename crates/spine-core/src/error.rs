//! Per-layer error enums, each exposing `category()` into the spec.md §7
//! taxonomy. Mirrors the teacher's split (`StorageError`/`ExecutorError`/
//! `RegistryError`/`WorkerPoolError`/`ActivityError`/`WorkflowError`) but
//! with the categories this spec actually names.

use spine_contracts::ErrorCategory;
use spine_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("execution {0} not found")]
    NotFound(String),

    #[error("illegal transition from {from} to {to} for execution {id}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::NotFound(_) => ErrorCategory::NotFound,
            LedgerError::IllegalTransition { .. } => ErrorCategory::Conflict,
            LedgerError::Storage(e) => e.category(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("operation '{0}' is not registered")]
    OperationNotFound(String),

    #[error("workflow '{0}' is not registered")]
    WorkflowNotFound(String),

    #[error("workflow '{name}' failed validation: {reason}")]
    InvalidWorkflow { name: String, reason: String },
}

impl RegistryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RegistryError::OperationNotFound(_) | RegistryError::WorkflowNotFound(_) => ErrorCategory::NotFound,
            RegistryError::InvalidWorkflow { .. } => ErrorCategory::Validation,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("concurrency lock '{0}' is held by another execution")]
    LockContention(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DispatchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DispatchError::Registry(e) => e.category(),
            DispatchError::Ledger(e) => e.category(),
            DispatchError::LockContention(_) => ErrorCategory::LockContention,
            DispatchError::Storage(e) => e.category(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow validation failed: {0}")]
    Validation(String),

    #[error("step '{0}' timed out")]
    Timeout(String),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_) => ErrorCategory::Validation,
            WorkflowError::Timeout(_) => ErrorCategory::Timeout,
            WorkflowError::Dispatch(e) => e.category(),
            WorkflowError::Storage(e) => e.category(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work item {0} not found")]
    NotFound(i64),

    #[error("work item {0} is not claimable")]
    NotClaimable(i64),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueueError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::NotFound(_) => ErrorCategory::NotFound,
            QueueError::NotClaimable(_) => ErrorCategory::Conflict,
            QueueError::Storage(e) => e.category(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule {0} not found")]
    NotFound(String),

    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SchedulerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SchedulerError::NotFound(_) => ErrorCategory::NotFound,
            SchedulerError::InvalidCron(..) => ErrorCategory::Validation,
            SchedulerError::Dispatch(e) => e.category(),
            SchedulerError::Storage(e) => e.category(),
        }
    }
}
