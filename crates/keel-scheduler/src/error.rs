//! Scheduler error types.

use std::fmt;

use thiserror::Error;

use keel_core::AppError;

/// Errors reported by a cluster backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("service {id}: update out of sequence (presented version {presented}, current {current})")]
    VersionConflict {
        id: String,
        presented: u64,
        current: u64,
    },

    #[error("service not found: {0}")]
    NotFound(String),

    #[error("service name already in use: {0}")]
    NameConflict(String),

    #[error("cluster transport error: {0}")]
    Transport(String),
}

/// The mutating operation that failed during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "creating",
            Operation::Update => "updating",
            Operation::Remove => "removing",
        })
    }
}

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("error listing cluster services: {0}")]
    List(#[source] ClusterError),

    #[error("error {operation} service for {process_type} process: {source}")]
    Service {
        operation: Operation,
        process_type: String,
        #[source]
        source: ClusterError,
    },

    #[error("invalid app: {0}")]
    InvalidApp(#[from] AppError),

    #[error("{0} is not supported by this scheduler")]
    Unsupported(&'static str),
}

impl SchedulerError {
    /// True when the backend does not model the requested operation at all,
    /// as opposed to a failure that might go away on retry.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, SchedulerError::Unsupported(_))
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
