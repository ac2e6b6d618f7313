use std::sync::Arc;
use tracing::{debug, error};

use crate::error::Result;
use crate::resolver::Bootstrap;
use crate::runner::{InvocationRunner, RunOutcome};

/// How sweeps hand invocations to the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Await each run before moving to the next row
    #[default]
    Inline,
    /// Spawn each run on the runtime and move on
    Spawned,
}

#[derive(Clone)]
pub struct ExecutionQueue {
    runner: Arc<InvocationRunner>,
    mode: ExecutionMode,
}

impl ExecutionQueue {
    pub fn new(runner: Arc<InvocationRunner>, mode: ExecutionMode) -> Self {
        Self { runner, mode }
    }

    pub fn runner(&self) -> &Arc<InvocationRunner> {
        &self.runner
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns whether the invocation was handed off. Inline runs count only when
    /// this caller actually claimed the row.
    pub async fn submit(&self, invocation_id: i64, bootstrap: Option<Bootstrap>) -> Result<bool> {
        match self.mode {
            ExecutionMode::Inline => {
                let outcome = self.runner.execute(invocation_id, bootstrap).await?;
                Ok(outcome != RunOutcome::NotClaimed)
            }
            ExecutionMode::Spawned => {
                let runner = self.runner.clone();
                tokio::spawn(async move {
                    match runner.execute(invocation_id, bootstrap).await {
                        Ok(outcome) => debug!(invocation_id, outcome = ?outcome, "Spawned run finished"),
                        Err(e) => error!(invocation_id, error = %e, "Spawned run failed"),
                    }
                });
                Ok(true)
            }
        }
    }
}
