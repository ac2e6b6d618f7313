use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::OperationCode;
use crate::state_machine::InvocationStatus;

/// One attempted call to a provider for one operation.
/// Maps to `clearance_invocations`.
///
/// Carries no reference to the internal subject or program; the first logged
/// request body (an identity row or a rendered payload) is the only record of
/// whose case this is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invocation {
    pub invocation_id: i64,
    pub provider_code: String,
    #[sqlx(try_from = "String")]
    pub operation_code: OperationCode,
    #[sqlx(try_from = "String")]
    pub status: InvocationStatus,
    pub attempt_count: i32,
    pub next_retry_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// New invocation for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvocation {
    pub provider_code: String,
    pub operation_code: OperationCode,
    /// Written as log row 1 together with the invocation row
    pub identity: Option<String>,
}

impl NewInvocation {
    pub fn new(provider_code: impl Into<String>, operation_code: OperationCode) -> Self {
        Self {
            provider_code: provider_code.into(),
            operation_code,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

impl Invocation {
    /// Attempts beyond the first one
    pub fn attempted_retries(&self) -> i32 {
        (self.attempt_count - 1).max(0)
    }
}
