use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::sweeps::ClearanceSweeps;
use super::SweepReport;
use crate::config::SchedulerConfig;
use crate::error::Result;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Pending,
    Retry,
    StatusPoll,
    Acknowledge,
}

impl SweepKind {
    pub const ALL: [SweepKind; 4] = [
        SweepKind::Pending,
        SweepKind::Retry,
        SweepKind::StatusPoll,
        SweepKind::Acknowledge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::StatusPoll => "status_poll",
            Self::Acknowledge => "acknowledge",
        }
    }

    fn interval(&self, config: &SchedulerConfig) -> Duration {
        let configured = match self {
            Self::Pending => config.pending_interval(),
            Self::Retry => config.retry_interval(),
            Self::StatusPoll => config.status_poll_interval(),
            Self::Acknowledge => config.acknowledge_interval(),
        };
        configured.max(MIN_SWEEP_INTERVAL)
    }

    async fn run(&self, sweeps: &ClearanceSweeps) -> Result<SweepReport> {
        match self {
            Self::Pending => sweeps.run_pending().await,
            Self::Retry => sweeps.run_retries().await,
            Self::StatusPoll => sweeps.poll_status().await,
            Self::Acknowledge => sweeps.poll_acknowledge().await,
        }
    }
}

/// Runs each sweep on its own interval until shut down
pub struct PeriodicScheduler {
    sweeps: Arc<ClearanceSweeps>,
    config: SchedulerConfig,
}

impl PeriodicScheduler {
    pub fn new(sweeps: Arc<ClearanceSweeps>, config: SchedulerConfig) -> Self {
        Self { sweeps, config }
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);
        let tasks = SweepKind::ALL
            .iter()
            .map(|kind| {
                let kind = *kind;
                let period = kind.interval(&self.config);
                let sweeps = self.sweeps.clone();
                let mut stop = shutdown.subscribe();
                info!(sweep = kind.as_str(), interval_seconds = period.as_secs(), "Starting sweep loop");

                tokio::spawn(async move {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                if let Err(e) = kind.run(&sweeps).await {
                                    error!(sweep = kind.as_str(), error = %e, "Sweep iteration failed");
                                }
                            }
                            _ = stop.changed() => break,
                        }
                    }
                    debug!(sweep = kind.as_str(), "Sweep loop stopped");
                })
            })
            .collect();

        SchedulerHandle { shutdown, tasks }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every loop after its current iteration
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Sweep loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    pub fn running_loops(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_have_a_floor() {
        let config = SchedulerConfig {
            pending_interval_seconds: 0,
            status_poll_interval_seconds: 90,
            ..SchedulerConfig::default()
        };
        assert_eq!(SweepKind::Pending.interval(&config), MIN_SWEEP_INTERVAL);
        assert_eq!(SweepKind::StatusPoll.interval(&config), Duration::from_secs(90));
    }
}
