use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::REMARK_SEPARATOR;
use crate::state_machine::ClearanceStatus;

/// Evolving summary of one subject's standing with one provider.
/// Maps to `clearances`; unique on `(subject_id, provider_code)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Clearance {
    pub clearance_id: i64,
    pub subject_id: i64,
    pub provider_code: String,
    #[sqlx(try_from = "String")]
    pub status: ClearanceStatus,
    pub requested_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub remarks: Option<String>,
    pub additional_remarks: Option<String>,
    pub updated_on: DateTime<Utc>,
}

/// A forward move of a clearance summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceAdvance {
    pub status: ClearanceStatus,
    pub outcome: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub additional_remark: Option<String>,
}

impl ClearanceAdvance {
    pub fn to(status: ClearanceStatus) -> Self {
        Self {
            status,
            outcome: None,
            completion_date: None,
            remark: None,
            additional_remark: None,
        }
    }

    pub fn completed(mut self, outcome: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.outcome = Some(outcome.into());
        self.completion_date = Some(at);
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_additional_remark(mut self, remark: impl Into<String>) -> Self {
        self.additional_remark = Some(remark.into());
        self
    }
}

/// Append `remark` to an existing remark list
pub fn append_remark(existing: Option<&str>, remark: &str) -> String {
    match existing.map(str::trim).filter(|s| !s.is_empty()) {
        Some(current) => format!("{current}{REMARK_SEPARATOR}{remark}"),
        None => remark.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_remark_to_empty() {
        assert_eq!(append_remark(None, "clearanceRequestId=R-1"), "clearanceRequestId=R-1");
        assert_eq!(append_remark(Some("  "), "a"), "a");
    }

    #[test]
    fn test_append_remark_uses_separator() {
        assert_eq!(
            append_remark(Some("clearanceRequestId=R-1"), "clearanceResponseId=S-2"),
            "clearanceRequestId=R-1;clearanceResponseId=S-2"
        );
    }
}
