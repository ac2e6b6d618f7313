use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cross-reference between an internal subject/program pair and the provider's
/// own identifiers. Maps to `clearance_links`.
///
/// `provider_request_id` is written once at the create cycle. Later cycles only
/// fill in the response id and completion fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClearanceLink {
    pub link_id: i64,
    pub subject_id: i64,
    pub program_id: i64,
    pub provider_code: String,
    pub provider_request_id: Option<String>,
    pub provider_response_id: Option<String>,
    pub is_completed: bool,
    pub retry_count: i32,
    pub requested_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub updated_on: DateTime<Utc>,
}

impl ClearanceLink {
    pub fn request_id(&self) -> Option<&str> {
        self.provider_request_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn response_id(&self) -> Option<&str> {
        self.provider_response_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClearanceLink {
    pub subject_id: i64,
    pub program_id: i64,
    pub provider_code: String,
    pub provider_request_id: String,
}

/// Completion data recorded by a status cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCompletion {
    pub provider_response_id: Option<String>,
    pub completion_date: DateTime<Utc>,
}
