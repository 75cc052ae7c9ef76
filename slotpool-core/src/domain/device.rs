//! Device pool domain model
//!
//! Read-only views of a device pool, produced by the scheduler for callers.

use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;

/// Status of a device pool's scheduling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// Loop is sweeping and dispatching
    Running,

    /// Shutdown requested, waiting for the loop to exit
    Stopping,

    /// Loop has exited
    Stopped,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolStatus::Running => write!(f, "Running"),
            PoolStatus::Stopping => write!(f, "Stopping"),
            PoolStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Consistent snapshot of one device pool
///
/// Rendered with `Display` as one occupancy symbol per slot followed by
/// the queue depth and finished count, e.g. `[X][ ][X] : 3 queued, 1 finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub device: String,
    pub status: PoolStatus,
    /// Job occupying each slot, in slot order
    pub slots: Vec<Option<JobId>>,
    pub queued: usize,
    pub finished: usize,
    pub failed: usize,
}

impl PoolSnapshot {
    /// Number of occupied slots
    pub fn running(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.running() == 0
    }
}

impl std::fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for slot in &self.slots {
            match slot {
                Some(_) => write!(f, "[X]")?,
                None => write!(f, "[ ]")?,
            }
        }
        write!(f, " : {} queued, {} finished", self.queued, self.finished)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}
