//! Pull error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while pulling an image.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("progress stream error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PullResult<T> = Result<T, PullError>;
