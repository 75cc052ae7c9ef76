//! Execution backend contract
//!
//! A device pool never talks to a remote service directly. It goes through
//! these traits, implemented once per backend type (a real provider SDK, or
//! the in-memory simulator used by tests).
//!
//! All calls are expected to return quickly: the scheduler invokes them from
//! inside a sweep, so a hanging call stalls that device's whole sweep.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::job::Submission;
use crate::error::BackendError;

/// Submits work to one device
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Sends a submission to the device
    ///
    /// # Returns
    /// An opaque reference used to poll, cancel and fetch the job
    async fn submit(&self, submission: &Submission) -> Result<Arc<dyn RemoteJob>, BackendError>;
}

/// Reference to a job accepted by a backend
#[async_trait]
pub trait RemoteJob: Send + Sync {
    /// Backend-side identifier, for logging only
    fn remote_id(&self) -> String;

    /// Non-blocking completion check
    async fn is_done(&self) -> Result<bool, BackendError>;

    /// Requests cancellation
    ///
    /// Fails with `BackendError::AlreadyFinished` when the job is terminal.
    async fn cancel(&self) -> Result<(), BackendError>;

    /// Fetches the result; only valid once `is_done` returned true
    async fn fetch_result(&self) -> Result<serde_json::Value, BackendError>;
}

/// A named device and the backend that serves it
#[derive(Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub backend: Arc<dyn ExecutionBackend>,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

impl std::fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Enumerates the devices a provider account can reach
///
/// Names must be stable and unique; order is preserved for display.
pub trait DeviceProvider: Send + Sync {
    fn devices(&self) -> Vec<DeviceDescriptor>;
}
