//! Error types for the slotpool scheduler and its backends

use thiserror::Error;

use crate::domain::job::JobId;

/// Result type alias for scheduler operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Errors reported by an execution backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend refused the submission
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    /// Job already reached a terminal state on the backend
    #[error("Job {0} already finished")]
    AlreadyFinished(String),

    /// Backend could not be reached or answered with an error
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Result requested for a job that is not done
    #[error("Result unavailable for job {0}")]
    ResultUnavailable(String),

    #[error("Backend error: {0}")]
    Other(String),
}

/// Errors that can occur when scheduling jobs on device pools
#[derive(Debug, Error)]
pub enum PoolError {
    /// No pool exists for the device name
    #[error("Device not recognised: {0}")]
    UnrecognizedDevice(String),

    /// Two device descriptors share a name
    #[error("Duplicate device: {0}")]
    DuplicateDevice(String),

    /// `start` called on a job that was already submitted
    #[error("Job {0} already started")]
    AlreadyStarted(JobId),

    /// Cancel raced with completion on the backend
    #[error("Cannot cancel job {0}: already in a terminal state")]
    CancelOnTerminalJob(JobId),

    /// No finished job with this identifier
    #[error("Job {id} not found on device {device}")]
    NotFound { device: String, id: JobId },

    /// Pool no longer accepts work
    #[error("Pool for device {0} is shut down")]
    PoolStopped(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PoolError {
    /// Check if this error is the expected cancel/completion race
    pub fn is_terminal_race(&self) -> bool {
        matches!(self, Self::CancelOnTerminalJob(_))
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
