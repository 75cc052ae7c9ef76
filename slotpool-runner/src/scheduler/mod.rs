//! Scheduler layer
//!
//! This layer owns one bounded-concurrency pool per device and routes work
//! to them by device name. Each pool runs its own background loop that polls
//! running jobs and refills freed slots from its queue.

pub mod manager;
pub mod pool;

pub use manager::PoolManager;
pub use pool::{DevicePool, SweepReport};
