//! Pool configuration
//!
//! Defines the tunables shared by every device pool: how many jobs a device
//! may run at once, how often running jobs are polled, and how long to pause
//! after each submission.

use serde::{Deserialize, Serialize};
use slotpool_core::{PoolError, PoolResult};
use std::time::Duration;

const DEFAULT_WORKERS_PER_DEVICE: usize = 5;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_GRACE_INTERVAL: Duration = Duration::from_secs(1);

/// Device pool configuration
///
/// Supplied once to the `PoolManager` and copied into every pool it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrent execution slots per device
    pub workers_per_device: usize,

    /// Pause between two sweeps of a pool
    pub poll_interval: Duration,

    /// Pause after each submission, required by providers that rate-limit
    /// job creation
    pub grace_interval: Duration,
}

impl PoolConfig {
    /// Creates a configuration with the default grace interval
    pub fn new(workers_per_device: usize, poll_interval: Duration) -> Self {
        Self {
            workers_per_device,
            poll_interval,
            grace_interval: DEFAULT_GRACE_INTERVAL,
        }
    }

    /// Configuration with no pauses at all
    ///
    /// Meant for pools whose sweeps are driven by hand; it does not pass
    /// `validate` and is rejected by the `PoolManager`.
    pub fn test_mode(workers_per_device: usize) -> Self {
        Self {
            workers_per_device,
            poll_interval: Duration::ZERO,
            grace_interval: Duration::ZERO,
        }
    }

    /// Sets the pause after each submission
    pub fn with_grace_interval(mut self, grace_interval: Duration) -> Self {
        self.grace_interval = grace_interval;
        self
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables, all optional:
    /// - SLOTPOOL_WORKERS_PER_DEVICE (default: 5)
    /// - SLOTPOOL_POLL_INTERVAL_MS (milliseconds, default: 10000)
    /// - SLOTPOOL_GRACE_INTERVAL_MS (milliseconds, default: 1000)
    ///
    /// Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let workers_per_device = std::env::var("SLOTPOOL_WORKERS_PER_DEVICE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_WORKERS_PER_DEVICE);

        let poll_interval = std::env::var("SLOTPOOL_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let grace_interval = std::env::var("SLOTPOOL_GRACE_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GRACE_INTERVAL);

        Self {
            workers_per_device,
            poll_interval,
            grace_interval,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> PoolResult<()> {
        if self.workers_per_device == 0 {
            return Err(PoolError::InvalidConfig(
                "workers_per_device must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS_PER_DEVICE, DEFAULT_POLL_INTERVAL)
    }
}
