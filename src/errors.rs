use diesel::result::Error as DieselError;
use std::time::Duration;

use crate::core::TaskStatus;

/// Errors raised by the task store, the step cache, the isolated executor
/// and the pipeline handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Diesel error: {0}")]
    DieselError(#[from] DieselError),
    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task {0} not found")]
    TaskNotFound(String),
    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Invalid update for task {id}: {reason}")]
    InvalidUpdate { id: String, reason: String },
    #[error("Corrupt task record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),
    #[error("Handler already registered for task type {0}")]
    DuplicateHandler(String),
    #[error("Handler failed: {0}")]
    HandlerFailed(String),
    #[error("Company {0} not found")]
    CompanyNotFound(String),
    #[error("Company {0} already exists")]
    CompanyExists(String),

    #[error("Function {function} timed out after {elapsed:?}")]
    Timeout { function: String, elapsed: Duration },
    #[error("{kind}: {message}")]
    StageFailed { kind: String, message: String },
    #[error("Isolated process for {function} exited without a result ({status})")]
    ChildExited { function: String, status: String },
    #[error("Isolated protocol error: {0}")]
    ProtocolError(String),
}

impl Error {
    /// Returns true for failures of the persistence layer itself, as opposed
    /// to failures of the work being persisted.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::DieselError(_) | Error::PoolError(_) | Error::CorruptRecord { .. }
        )
    }

    /// Returns true when an isolated stage exceeded its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
