//! Job handles
//!
//! A `JobHandle` wraps one unit of work for its whole life: queued in a
//! device pool, submitted into a slot, then completed, cancelled, failed or
//! discarded. Handles are cheap to clone; the pool and the caller share the
//! same underlying job.

use chrono::{DateTime, Utc};
use slotpool_core::{
    BackendError, ExecutionBackend, JobId, JobOutcome, JobSnapshot, JobState, PoolError,
    PoolResult, RemoteJob, Submission,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Mutable part of a job, guarded by one lock
struct Lifecycle {
    state: JobState,
    /// Present once the backend accepted the submission
    remote: Option<Arc<dyn RemoteJob>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

struct JobInner {
    id: JobId,
    device: String,
    created_at: DateTime<Utc>,
    backend: Arc<dyn ExecutionBackend>,
    /// Taken by the first `start`, so the backend sees the job at most once
    submission: Mutex<Option<Submission>>,
    lifecycle: Mutex<Lifecycle>,
    result: OnceCell<serde_json::Value>,
}

/// Shared handle to one job
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl JobHandle {
    /// Creates a job in the `Created` state
    ///
    /// Nothing is sent to the backend until the owning pool dispatches it.
    pub fn new(
        id: JobId,
        device: impl Into<String>,
        submission: Submission,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id,
                device: device.into(),
                created_at: Utc::now(),
                backend,
                submission: Mutex::new(Some(submission)),
                lifecycle: Mutex::new(Lifecycle {
                    state: JobState::Created,
                    remote: None,
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                }),
                result: OnceCell::new(),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn device(&self) -> &str {
        &self.inner.device
    }

    pub fn state(&self) -> JobState {
        self.lifecycle().state
    }

    /// Backend-side identifier, once submitted
    pub fn remote_id(&self) -> Option<String> {
        self.lifecycle().remote.as_ref().map(|remote| remote.remote_id())
    }

    /// Point-in-time view for logging and reporting
    pub fn snapshot(&self) -> JobSnapshot {
        let lifecycle = self.lifecycle();
        JobSnapshot {
            id: self.inner.id,
            device: self.inner.device.clone(),
            state: lifecycle.state,
            remote_id: lifecycle.remote.as_ref().map(|remote| remote.remote_id()),
            created_at: self.inner.created_at,
            started_at: lifecycle.started_at,
            finished_at: lifecycle.finished_at,
            error_message: lifecycle.error_message.clone(),
        }
    }

    /// Submits the job to its backend
    ///
    /// The deferred submission runs exactly once. A second call fails with
    /// `PoolError::AlreadyStarted`. A rejected submission leaves the job
    /// `Failed`; it is never retried. Only the owning pool dispatches jobs,
    /// so a job is never running without a slot behind it.
    pub(crate) async fn start(&self) -> PoolResult<()> {
        match self.state() {
            JobState::Created => {}
            JobState::Discarded => return Err(PoolError::PoolStopped(self.inner.device.clone())),
            _ => return Err(PoolError::AlreadyStarted(self.inner.id)),
        }

        let submission = self
            .inner
            .submission
            .lock()
            .unwrap()
            .take()
            .ok_or(PoolError::AlreadyStarted(self.inner.id))?;

        match self.inner.backend.submit(&submission).await {
            Ok(remote) => {
                let remote_id = remote.remote_id();
                let mut lifecycle = self.lifecycle();
                lifecycle.remote = Some(remote);
                lifecycle.state = JobState::Running;
                lifecycle.started_at = Some(Utc::now());
                drop(lifecycle);

                info!(
                    device = %self.inner.device,
                    job_id = self.inner.id,
                    %remote_id,
                    "Job submitted"
                );
                Ok(())
            }
            Err(e) => {
                self.mark_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Checks whether the job has finished
    ///
    /// Returns `false` for jobs that were never submitted or ended without
    /// completing, `true` for completed jobs, and otherwise asks the backend.
    /// Still running is `Ok(false)`, not an error. The state is not changed
    /// here; the owning pool records the completion.
    pub async fn poll(&self) -> PoolResult<bool> {
        let remote = {
            let lifecycle = self.lifecycle();
            match lifecycle.state {
                JobState::Completed => return Ok(true),
                JobState::Running => lifecycle.remote.clone(),
                _ => return Ok(false),
            }
        };

        match remote {
            Some(remote) => Ok(remote.is_done().await?),
            None => Ok(false),
        }
    }

    /// Requests cancellation on the backend
    ///
    /// A job that was never submitted is left alone. If the backend reports
    /// the job already finished, this fails with
    /// `PoolError::CancelOnTerminalJob`; callers cancelling a single job see
    /// the race, while pool shutdown tolerates it.
    pub async fn cancel(&self) -> PoolResult<()> {
        let remote = {
            let lifecycle = self.lifecycle();
            match lifecycle.state {
                JobState::Created | JobState::Discarded | JobState::Cancelled => return Ok(()),
                JobState::Completed | JobState::Failed => {
                    return Err(PoolError::CancelOnTerminalJob(self.inner.id));
                }
                JobState::Running => lifecycle.remote.clone(),
            }
        };

        let Some(remote) = remote else {
            return Ok(());
        };

        match remote.cancel().await {
            Ok(()) => {
                let mut lifecycle = self.lifecycle();
                if lifecycle.state == JobState::Running {
                    lifecycle.state = JobState::Cancelled;
                    lifecycle.finished_at = Some(Utc::now());
                }
                drop(lifecycle);

                debug!(device = %self.inner.device, job_id = self.inner.id, "Job cancelled");
                Ok(())
            }
            Err(BackendError::AlreadyFinished(_)) => {
                Err(PoolError::CancelOnTerminalJob(self.inner.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the job's result without blocking
    ///
    /// `JobOutcome::NotReady` until `poll` reports completion. The value is
    /// fetched from the backend once and every later call returns it again.
    pub async fn result(&self) -> PoolResult<JobOutcome> {
        if let Some(value) = self.inner.result.get() {
            return Ok(JobOutcome::Ready(value.clone()));
        }

        if !self.poll().await? {
            return Ok(JobOutcome::NotReady);
        }

        let remote = self.lifecycle().remote.clone();
        let Some(remote) = remote else {
            return Ok(JobOutcome::NotReady);
        };

        let value = self
            .inner
            .result
            .get_or_try_init(|| async move { remote.fetch_result().await })
            .await?;

        Ok(JobOutcome::Ready(value.clone()))
    }

    pub(crate) fn mark_completed(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == JobState::Running {
            lifecycle.state = JobState::Completed;
            lifecycle.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_failed(&self, reason: String) {
        let mut lifecycle = self.lifecycle();
        if !lifecycle.state.is_terminal() {
            lifecycle.state = JobState::Failed;
            lifecycle.finished_at = Some(Utc::now());
            lifecycle.error_message = Some(reason);
        }
    }

    /// Marks the job failed and asks the backend to drop it
    ///
    /// The cancel is best-effort; the job stays `Failed` whatever the backend
    /// answers.
    pub(crate) async fn abandon(&self, reason: String) {
        let remote = self.lifecycle().remote.clone();
        self.mark_failed(reason);

        if let Some(remote) = remote {
            if let Err(e) = remote.cancel().await {
                debug!(
                    device = %self.inner.device,
                    job_id = self.inner.id,
                    error = %e,
                    "Could not cancel abandoned job"
                );
            }
        }
    }

    /// Drops a queued job without ever submitting it
    pub(crate) fn mark_discarded(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == JobState::Created {
            lifecycle.state = JobState::Discarded;
            lifecycle.finished_at = Some(Utc::now());
            self.inner.submission.lock().unwrap().take();
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().unwrap()
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("state", &self.state())
            .finish()
    }
}
