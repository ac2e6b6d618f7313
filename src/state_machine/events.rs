use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events that move an invocation between lifecycle states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InvocationEvent {
    /// Runner takes ownership of one attempt
    Claim,
    /// Provider answered with a 2xx
    Succeed,
    /// Attempt failed with budget remaining
    ScheduleRetry(DateTime<Utc>),
    /// Attempt failed and nothing will pick it up again
    GiveUp(String),
    /// Retry sweep found the row due
    Requeue,
    /// Polling sweep re-arms an existing invocation for another cycle
    Rearm,
}

impl InvocationEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Succeed => "succeed",
            Self::ScheduleRetry(_) => "schedule_retry",
            Self::GiveUp(_) => "give_up",
            Self::Requeue => "requeue",
            Self::Rearm => "rearm",
        }
    }

    pub fn next_retry_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ScheduleRetry(at) => Some(*at),
            _ => None,
        }
    }
}
