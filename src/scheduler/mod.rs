//! # Retry & Polling Scheduler
//!
//! Sweeps that move invocations forward without a caller:
//!
//! - **pending**: run every PENDING invocation
//! - **retry**: requeue due RETRY rows (bounded, oldest due first) and run them
//! - **status poll**: re-arm or create GET_CLEARANCE_STATUS invocations for open
//!   clearances, within each endpoint's retrigger budget
//! - **acknowledge**: the same for ACKNOWLEDGE_RESPONSE on cleared results of
//!   three-cycle providers
//!
//! [`PeriodicScheduler`] drives the sweeps on independent tokio intervals.

pub mod periodic;
pub mod queue;
pub mod sweeps;

use serde::Serialize;

use crate::logging::log_sweep_summary;

pub use periodic::{PeriodicScheduler, SchedulerHandle};
pub use queue::{ExecutionMode, ExecutionQueue};
pub use sweeps::ClearanceSweeps;

/// Counts from one sweep iteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweep: &'static str,
    pub examined: usize,
    pub advanced: usize,
    pub skipped: usize,
}

impl SweepReport {
    pub fn new(sweep: &'static str, examined: usize) -> Self {
        Self {
            sweep,
            examined,
            advanced: 0,
            skipped: 0,
        }
    }

    pub(crate) fn logged(self) -> Self {
        log_sweep_summary(self.sweep, self.examined, self.advanced, self.skipped);
        self
    }
}
