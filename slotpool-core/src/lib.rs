//! Slotpool Core
//!
//! Core types and abstractions shared by the slotpool scheduler and its backends.
//!
//! This crate contains:
//! - Domain types: jobs, lifecycle states, pool snapshots
//! - Backend contract: the traits a remote execution service must implement
//! - Errors: the scheduler and backend error taxonomy

pub mod backend;
pub mod domain;
pub mod error;

pub use backend::{DeviceDescriptor, DeviceProvider, ExecutionBackend, RemoteJob};
pub use domain::device::{PoolSnapshot, PoolStatus};
pub use domain::job::{JobId, JobOutcome, JobSnapshot, JobState, Submission};
pub use error::{BackendError, PoolError, PoolResult};
