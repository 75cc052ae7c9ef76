//! Slotpool simulated backend
//!
//! An in-memory execution backend implementing the `slotpool-core` contract.
//! Each submission follows a scripted behaviour, which makes it possible to
//! reproduce completion, failure and cancel races deterministically in tests
//! and to run the scheduler without a real provider account.
//!
//! # Example
//!
//! ```no_run
//! use slotpool_core::{ExecutionBackend, RemoteJob, Submission};
//! use slotpool_sim::{JobScript, SimBackend};
//!
//! # async fn example() -> Result<(), slotpool_core::BackendError> {
//! let backend = SimBackend::new("sim_lima");
//! backend.script(JobScript::Never);
//!
//! let remote = backend.submit(&Submission::new(serde_json::json!("bell"))).await?;
//! assert!(!remote.is_done().await?);
//! # Ok(())
//! # }
//! ```

mod jobs;
mod provider;

pub use jobs::SimRemoteJob;
pub use provider::SimProvider;

use async_trait::async_trait;
use slotpool_core::{BackendError, ExecutionBackend, RemoteJob, Submission};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Scripted behaviour of one simulated job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScript {
    /// Reports done on the n-th poll (0 means done before the first poll)
    CompleteAfter(u32),
    /// Never completes; only cancellation ends it
    Never,
    /// Every poll fails with `BackendError::Unavailable`
    FailPoll,
    /// The submission itself is rejected
    RejectSubmit,
    /// Finishes at the moment cancellation is requested, so cancel loses the race
    FinishOnCancel,
}

impl Default for JobScript {
    fn default() -> Self {
        JobScript::CompleteAfter(1)
    }
}

/// Shared bookkeeping between a backend and the jobs it created
#[derive(Debug, Default)]
pub(crate) struct SimLedger {
    pub(crate) submitted: Vec<String>,
    pub(crate) cancelled: Vec<String>,
    pub(crate) results_fetched: usize,
    pub(crate) in_flight: usize,
    pub(crate) max_in_flight: usize,
}

impl SimLedger {
    pub(crate) fn job_left(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// In-memory backend for one device
///
/// Cloning shares the same scripts and ledger.
#[derive(Debug, Clone)]
pub struct SimBackend {
    device: String,
    default_script: JobScript,
    scripts: Arc<Mutex<VecDeque<JobScript>>>,
    ledger: Arc<Mutex<SimLedger>>,
}

impl SimBackend {
    /// Creates a backend whose jobs complete on their first poll
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_default_script(device, JobScript::default())
    }

    /// Creates a backend with a custom behaviour for unscripted submissions
    pub fn with_default_script(device: impl Into<String>, default_script: JobScript) -> Self {
        Self {
            device: device.into(),
            default_script,
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            ledger: Arc::new(Mutex::new(SimLedger::default())),
        }
    }

    /// Get the device name
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Queues a behaviour for the next submission
    ///
    /// Scripts are consumed in submission order.
    pub fn script(&self, script: JobScript) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// Remote ids of every accepted submission, in order
    pub fn submitted(&self) -> Vec<String> {
        self.ledger.lock().unwrap().submitted.clone()
    }

    /// Remote ids of every successfully cancelled job
    pub fn cancelled(&self) -> Vec<String> {
        self.ledger.lock().unwrap().cancelled.clone()
    }

    /// Number of result fetches served
    pub fn results_fetched(&self) -> usize {
        self.ledger.lock().unwrap().results_fetched
    }

    /// Jobs accepted and not yet finished or cancelled
    pub fn in_flight(&self) -> usize {
        self.ledger.lock().unwrap().in_flight
    }

    /// Highest number of jobs ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.ledger.lock().unwrap().max_in_flight
    }

    fn next_script(&self) -> JobScript {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_script)
    }
}

#[async_trait]
impl ExecutionBackend for SimBackend {
    async fn submit(&self, submission: &Submission) -> Result<Arc<dyn RemoteJob>, BackendError> {
        let script = self.next_script();
        if script == JobScript::RejectSubmit {
            debug!(device = %self.device, "Rejecting scripted submission");
            return Err(BackendError::SubmissionRejected(format!(
                "{} refused the job",
                self.device
            )));
        }

        let remote_id = format!("{}-{}", self.device, Uuid::new_v4());
        {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.submitted.push(remote_id.clone());
            ledger.in_flight += 1;
            ledger.max_in_flight = ledger.max_in_flight.max(ledger.in_flight);
        }

        debug!(device = %self.device, %remote_id, ?script, "Accepted submission");

        Ok(Arc::new(SimRemoteJob::new(
            remote_id,
            self.device.clone(),
            submission.payload.clone(),
            script,
            Arc::clone(&self.ledger),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission::new(serde_json::json!({"circuit": "ghz"}))
    }

    #[tokio::test]
    async fn test_scripts_consumed_in_order() {
        let backend = SimBackend::new("sim_a");
        backend.script(JobScript::Never).script(JobScript::CompleteAfter(0));

        let first = backend.submit(&submission()).await.unwrap();
        let second = backend.submit(&submission()).await.unwrap();

        assert!(!first.is_done().await.unwrap());
        assert!(second.is_done().await.unwrap());
        assert_eq!(backend.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_reject_submit() {
        let backend = SimBackend::new("sim_a");
        backend.script(JobScript::RejectSubmit);

        let result = backend.submit(&submission()).await;
        assert!(matches!(result, Err(BackendError::SubmissionRejected(_))));
        assert!(backend.submitted().is_empty());
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);

        let a = backend.submit(&submission()).await.unwrap();
        let _b = backend.submit(&submission()).await.unwrap();
        assert_eq!(backend.in_flight(), 2);

        a.cancel().await.unwrap();
        assert_eq!(backend.in_flight(), 1);
        assert_eq!(backend.max_in_flight(), 2);
        assert_eq!(backend.cancelled().len(), 1);
    }
}
