//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a job within its device pool
///
/// Identifiers are minted per pool, starting at 0 and strictly increasing.
/// They are not unique across devices: address a job globally with the
/// pair `(device, JobId)`.
pub type JobId = u64;

/// Unit of work handed to a backend
///
/// The scheduler never looks inside the payload; it is forwarded verbatim
/// to the device's backend at dispatch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub payload: serde_json::Value,
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Submission {
    /// Creates a submission with no extra parameters
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            parameters: HashMap::new(),
        }
    }

    /// Adds a backend parameter (e.g. shot count, optimisation level)
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Lifecycle state of a job handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Queued, never submitted
    Created,
    /// Submitted to the backend and occupying a slot
    Running,
    /// Backend reported completion
    Completed,
    /// Cancelled on the backend
    Cancelled,
    /// Submission or polling failed on the backend
    Failed,
    /// Dropped from the queue at shutdown before ever being submitted
    Discarded,
}

impl JobState {
    /// Whether the job can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed | JobState::Discarded
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Cancelled => write!(f, "Cancelled"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Discarded => write!(f, "Discarded"),
        }
    }
}

/// Point-in-time view of a job handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub device: String,
    pub state: JobState,
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Answer of a non-blocking result query
///
/// `NotReady` is the normal answer while the job is still queued or running;
/// it is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Ready(serde_json::Value),
    NotReady,
}

impl JobOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, JobOutcome::Ready(_))
    }

    /// Returns the value if ready
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            JobOutcome::Ready(value) => Some(value),
            JobOutcome::NotReady => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Discarded.is_terminal());
    }

    #[test]
    fn test_submission_params() {
        let submission = Submission::new(serde_json::json!({"circuit": "bell"}))
            .with_param("shots", serde_json::json!(1024));

        assert_eq!(submission.payload["circuit"], "bell");
        assert_eq!(submission.parameters.get("shots"), Some(&serde_json::json!(1024)));
    }

    #[test]
    fn test_outcome_into_value() {
        let ready = JobOutcome::Ready(serde_json::json!(7));
        assert!(ready.is_ready());
        assert_eq!(ready.into_value(), Some(serde_json::json!(7)));
        assert_eq!(JobOutcome::NotReady.into_value(), None);
    }
}
