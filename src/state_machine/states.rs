use serde::{Deserialize, Serialize};
use std::fmt;

/// Invocation lifecycle states as persisted in the invocation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationStatus {
    /// Created by a caller or requeued by a sweep, waiting to run
    Pending,
    /// An attempt is running right now
    InProgress,
    /// The provider accepted the call
    Success,
    /// Used on log rows for a failed exchange; invocations never rest here
    Failed,
    /// Failed with budget remaining; carries a next retry time
    Retry,
    /// Budget exhausted or data problem; never revisited automatically
    PermanentlyFailed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Retry => "RETRY",
            Self::PermanentlyFailed => "PERMANENTLY_FAILED",
        }
    }

    /// States an attempt can end in
    pub fn is_attempt_outcome(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Retry | Self::PermanentlyFailed
        )
    }

    /// Check if this is a terminal state that sweeps never touch
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermanentlyFailed)
    }

    /// Whether an attempt may be claimed from this state
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }
}

impl Default for InvocationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "RETRY" => Ok(Self::Retry),
            "PERMANENTLY_FAILED" => Ok(Self::PermanentlyFailed),
            _ => Err(format!("Invalid invocation status: {s}")),
        }
    }
}

impl TryFrom<String> for InvocationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Summary status of a subject's clearance with one provider.
///
/// Ordered: a clearance only ever moves to a status with a higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearanceStatus {
    Requested,
    Cleared,
    Delivered,
}

impl ClearanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Cleared => "CLEARED",
            Self::Delivered => "DELIVERED",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Requested => 1,
            Self::Cleared => 2,
            Self::Delivered => 3,
        }
    }

    /// Forward-only check; staying in place is allowed so updates are idempotent
    pub fn can_advance_to(&self, next: ClearanceStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for ClearanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClearanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" | "CLEARANCE_REQUESTED" => Ok(Self::Requested),
            "CLEARED" => Ok(Self::Cleared),
            "DELIVERED" => Ok(Self::Delivered),
            _ => Err(format!("Invalid clearance status: {s}")),
        }
    }
}

impl TryFrom<String> for ClearanceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
