use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::state_machine::InvocationStatus;

/// Append-only audit row for an invocation. Maps to `clearance_invocation_logs`.
///
/// A row is an identity row (the ids the invocation was created for, never
/// sent), a request row (body + sent timestamp) or a response row (body,
/// status code, elapsed time, error detail). Sequence numbers are
/// strictly increasing per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvocationLog {
    pub log_id: i64,
    pub invocation_id: i64,
    pub sequence: i32,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub response_status_code: Option<i32>,
    #[sqlx(try_from = "String")]
    pub status: InvocationStatus,
    pub request_sent_on: Option<DateTime<Utc>>,
    pub response_received_on: Option<DateTime<Utc>>,
    pub response_time_ms: Option<i64>,
    pub error_details: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl InvocationLog {
    pub fn has_request_body(&self) -> bool {
        self.request_payload
            .as_deref()
            .is_some_and(|body| !body.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvocationLog {
    pub invocation_id: i64,
    pub sequence: i32,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub response_status_code: Option<i32>,
    pub status: InvocationStatus,
    pub request_sent_on: Option<DateTime<Utc>>,
    pub response_received_on: Option<DateTime<Utc>>,
    pub response_time_ms: Option<i64>,
    pub error_details: Option<String>,
}

impl NewInvocationLog {
    pub fn request(invocation_id: i64, sequence: i32, body: Option<String>) -> Self {
        Self {
            invocation_id,
            sequence,
            request_payload: body,
            response_payload: None,
            response_status_code: None,
            status: InvocationStatus::InProgress,
            request_sent_on: Some(Utc::now()),
            response_received_on: None,
            response_time_ms: None,
            error_details: None,
        }
    }

    /// Ids the invocation serves, logged before any attempt can fail
    pub fn identity(invocation_id: i64, sequence: i32, body: impl Into<String>) -> Self {
        Self {
            invocation_id,
            sequence,
            request_payload: Some(body.into()),
            response_payload: None,
            response_status_code: None,
            status: InvocationStatus::Pending,
            request_sent_on: None,
            response_received_on: None,
            response_time_ms: None,
            error_details: None,
        }
    }

    pub fn response(
        invocation_id: i64,
        sequence: i32,
        status: InvocationStatus,
        status_code: u16,
        body: Option<String>,
        elapsed_ms: i64,
        error_details: Option<String>,
    ) -> Self {
        Self {
            invocation_id,
            sequence,
            request_payload: None,
            response_payload: body,
            response_status_code: Some(i32::from(status_code)),
            status,
            request_sent_on: None,
            response_received_on: Some(Utc::now()),
            response_time_ms: Some(elapsed_ms),
            error_details,
        }
    }

    /// Row recording a failure that never produced a provider response
    pub fn error(invocation_id: i64, sequence: i32, details: impl Into<String>) -> Self {
        Self {
            invocation_id,
            sequence,
            request_payload: None,
            response_payload: None,
            response_status_code: None,
            status: InvocationStatus::Failed,
            request_sent_on: None,
            response_received_on: Some(Utc::now()),
            response_time_ms: None,
            error_details: Some(details.into()),
        }
    }
}
