//! Simulated remote jobs

use async_trait::async_trait;
use slotpool_core::{BackendError, RemoteJob};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{JobScript, SimLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimStatus {
    Running,
    Done,
    Cancelled,
}

#[derive(Debug)]
struct SimProgress {
    status: SimStatus,
    polls: u32,
}

/// A job accepted by `SimBackend`
#[derive(Debug)]
pub struct SimRemoteJob {
    remote_id: String,
    device: String,
    payload: serde_json::Value,
    script: JobScript,
    progress: Mutex<SimProgress>,
    ledger: Arc<Mutex<SimLedger>>,
}

impl SimRemoteJob {
    pub(crate) fn new(
        remote_id: String,
        device: String,
        payload: serde_json::Value,
        script: JobScript,
        ledger: Arc<Mutex<SimLedger>>,
    ) -> Self {
        Self {
            remote_id,
            device,
            payload,
            script,
            progress: Mutex::new(SimProgress {
                status: SimStatus::Running,
                polls: 0,
            }),
            ledger,
        }
    }

    /// Moves the job out of the running state and releases its ledger entry
    fn finish(&self, progress: &mut SimProgress, status: SimStatus) {
        if progress.status == SimStatus::Running {
            self.ledger.lock().unwrap().job_left();
        }
        progress.status = status;
    }
}

#[async_trait]
impl RemoteJob for SimRemoteJob {
    fn remote_id(&self) -> String {
        self.remote_id.clone()
    }

    async fn is_done(&self) -> Result<bool, BackendError> {
        let mut progress = self.progress.lock().unwrap();
        match progress.status {
            SimStatus::Done => return Ok(true),
            SimStatus::Cancelled => return Ok(false),
            SimStatus::Running => {}
        }

        match self.script {
            JobScript::FailPoll => Err(BackendError::Unavailable(format!(
                "{} did not answer status query for {}",
                self.device, self.remote_id
            ))),
            JobScript::CompleteAfter(n) => {
                progress.polls += 1;
                if progress.polls >= n {
                    self.finish(&mut progress, SimStatus::Done);
                    debug!(remote_id = %self.remote_id, polls = progress.polls, "Simulated job done");
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            JobScript::Never | JobScript::FinishOnCancel | JobScript::RejectSubmit => {
                progress.polls += 1;
                Ok(false)
            }
        }
    }

    async fn cancel(&self) -> Result<(), BackendError> {
        let mut progress = self.progress.lock().unwrap();
        match progress.status {
            SimStatus::Done => return Err(BackendError::AlreadyFinished(self.remote_id.clone())),
            SimStatus::Cancelled => return Ok(()),
            SimStatus::Running => {}
        }

        if self.script == JobScript::FinishOnCancel {
            self.finish(&mut progress, SimStatus::Done);
            return Err(BackendError::AlreadyFinished(self.remote_id.clone()));
        }

        self.finish(&mut progress, SimStatus::Cancelled);
        self.ledger
            .lock()
            .unwrap()
            .cancelled
            .push(self.remote_id.clone());
        debug!(remote_id = %self.remote_id, "Simulated job cancelled");
        Ok(())
    }

    async fn fetch_result(&self) -> Result<serde_json::Value, BackendError> {
        if self.progress.lock().unwrap().status != SimStatus::Done {
            return Err(BackendError::ResultUnavailable(self.remote_id.clone()));
        }

        self.ledger.lock().unwrap().results_fetched += 1;
        Ok(serde_json::json!({
            "device": self.device,
            "remote_id": self.remote_id,
            "payload": self.payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(script: JobScript) -> SimRemoteJob {
        SimRemoteJob::new(
            "sim-1".to_string(),
            "sim_a".to_string(),
            serde_json::json!({"circuit": "bell"}),
            script,
            Arc::new(Mutex::new(SimLedger {
                in_flight: 1,
                ..Default::default()
            })),
        )
    }

    #[tokio::test]
    async fn test_complete_after_polls() {
        let job = job(JobScript::CompleteAfter(2));
        assert!(!job.is_done().await.unwrap());
        assert!(job.is_done().await.unwrap());
        assert!(job.is_done().await.unwrap());
    }

    #[tokio::test]
    async fn test_result_only_when_done() {
        let job = job(JobScript::CompleteAfter(1));
        assert!(matches!(
            job.fetch_result().await,
            Err(BackendError::ResultUnavailable(_))
        ));

        assert!(job.is_done().await.unwrap());
        let value = job.fetch_result().await.unwrap();
        assert_eq!(value["payload"]["circuit"], "bell");
        assert_eq!(value["device"], "sim_a");
    }

    #[tokio::test]
    async fn test_cancel_after_done_fails() {
        let job = job(JobScript::CompleteAfter(0));
        assert!(job.is_done().await.unwrap());
        assert!(matches!(
            job.cancel().await,
            Err(BackendError::AlreadyFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_finish_on_cancel_race() {
        let job = job(JobScript::FinishOnCancel);
        assert!(!job.is_done().await.unwrap());
        assert!(matches!(
            job.cancel().await,
            Err(BackendError::AlreadyFinished(_))
        ));
        assert!(job.is_done().await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_poll() {
        let job = job(JobScript::FailPoll);
        assert!(matches!(
            job.is_done().await,
            Err(BackendError::Unavailable(_))
        ));
    }
}
