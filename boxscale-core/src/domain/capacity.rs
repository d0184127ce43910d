//! Capacity rule
//!
//! Converts a queue sample into the number of build boxes wanted. The rule
//! holds no state between cycles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of concurrent workers (executors) on each build box
///
/// Always at least one, so the capacity rule never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersPerBox(u32);

/// Rejected workers-per-box value
#[derive(Debug, Error, PartialEq, Eq)]
#[error("workers per build box must be at least 1")]
pub struct ZeroWorkers;

impl WorkersPerBox {
    pub fn new(workers: u32) -> Result<Self, ZeroWorkers> {
        if workers == 0 {
            return Err(ZeroWorkers);
        }
        Ok(Self(workers))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for WorkersPerBox {
    fn default() -> Self {
        Self(2)
    }
}

/// Boxes needed to serve `queue_size` buildable entries: `ceil(q / w)`
pub fn boxes_needed(queue_size: u32, workers: WorkersPerBox) -> u32 {
    queue_size.div_ceil(workers.get())
}
