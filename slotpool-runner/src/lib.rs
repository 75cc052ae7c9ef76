//! Slotpool Runner
//!
//! Dispatches independent jobs to a fixed set of named devices, each with a
//! limited number of concurrent execution slots and a poll-based completion
//! protocol.
//!
//! Architecture:
//! - Configuration: slot count, poll and grace intervals
//! - Jobs: `JobHandle`, the lifecycle wrapper shared by caller and scheduler
//! - Scheduler: one `DevicePool` per device, routed by the `PoolManager`

pub mod config;
pub mod job;
pub mod scheduler;

pub use config::PoolConfig;
pub use job::JobHandle;
pub use scheduler::{DevicePool, PoolManager, SweepReport};
