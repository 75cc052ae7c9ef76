//! Core domain types
//!
//! Structures shared between the scheduler (which owns job lifecycles) and
//! callers (which hold job handles and read pool snapshots).

pub mod device;
pub mod job;
