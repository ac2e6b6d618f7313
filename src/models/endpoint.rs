use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::OperationCode;
use crate::state_machine::InvocationStatus;

/// Data-driven definition of how to call one (provider, operation) pair.
/// Maps to `integration_endpoints`, or to an entry of the `endpoints` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EndpointDefinition {
    #[serde(default)]
    pub endpoint_id: i64,
    pub provider_code: String,
    #[sqlx(try_from = "String")]
    pub operation_code: OperationCode,
    pub base_url: String,
    #[serde(default)]
    pub path_template: String,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i32,
    #[serde(default)]
    pub payload_template: String,
    /// Comma separated model names, e.g. `Subject,Program,ProviderRequest`
    #[serde(default)]
    pub required_models: String,
    #[serde(default)]
    pub retrigger: bool,
    #[serde(default)]
    pub retrigger_count: i32,
    #[serde(default = "default_interval_minutes")]
    pub retrigger_interval_minutes: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_http_method() -> String {
    "POST".to_string()
}

fn default_timeout_seconds() -> i32 {
    30
}

fn default_interval_minutes() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl EndpointDefinition {
    pub fn required_model_names(&self) -> Vec<String> {
        self.required_models
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.retrigger,
            max_attempts: self.retrigger_count,
            interval_minutes: self.retrigger_interval_minutes,
        }
    }

    pub fn has_payload_template(&self) -> bool {
        !self.payload_template.trim().is_empty()
    }
}

/// Where an attempt lands after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    GiveUp,
}

impl RetryDecision {
    pub fn status(&self) -> InvocationStatus {
        match self {
            Self::RetryAt(_) => InvocationStatus::Retry,
            Self::GiveUp => InvocationStatus::PermanentlyFailed,
        }
    }

    pub fn next_retry_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RetryAt(at) => Some(*at),
            Self::GiveUp => None,
        }
    }
}

/// Retry budget of an endpoint. `max_attempts` is the total number of attempts
/// an invocation may make, so the status sweep and the runner agree on when
/// the budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: i32,
    pub interval_minutes: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            interval_minutes: 5,
        }
    }
}

/// Retry intervals never drop below one minute
pub const MIN_RETRY_INTERVAL_MINUTES: i64 = 1;

impl RetryPolicy {
    pub fn has_budget_for(&self, attempt_count: i32) -> bool {
        self.enabled && attempt_count < self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes).max(MIN_RETRY_INTERVAL_MINUTES))
    }

    /// Classify a failed attempt given the attempt count after the claim
    pub fn decide(&self, attempt_count: i32, now: DateTime<Utc>) -> RetryDecision {
        if self.has_budget_for(attempt_count) {
            RetryDecision::RetryAt(now + self.interval())
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(enabled: bool, max_attempts: i32, interval_minutes: i32) -> RetryPolicy {
        RetryPolicy {
            enabled,
            max_attempts,
            interval_minutes,
        }
    }

    #[test]
    fn test_retry_while_attempts_below_budget() {
        let now = Utc::now();
        let p = policy(true, 3, 1);
        assert_eq!(p.decide(1, now), RetryDecision::RetryAt(now + Duration::minutes(1)));
        assert_eq!(p.decide(2, now).status(), InvocationStatus::Retry);
        assert_eq!(p.decide(3, now), RetryDecision::GiveUp);
    }

    #[test]
    fn test_disabled_retrigger_gives_up_immediately() {
        assert_eq!(policy(false, 5, 1).decide(1, Utc::now()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_interval_has_one_minute_floor() {
        assert_eq!(policy(true, 3, 0).interval(), Duration::minutes(1));
        assert_eq!(policy(true, 3, -4).interval(), Duration::minutes(1));
        assert_eq!(policy(true, 3, 15).interval(), Duration::minutes(15));
    }

    #[test]
    fn test_required_model_names_are_trimmed() {
        let endpoint: EndpointDefinition = serde_yaml::from_str(
            r#"
provider_code: MEDX
operation_code: CREATE_CLEARANCE_REQUEST
base_url: https://provider.test
required_models: " Subject, Program ,,ProviderRequest "
"#,
        )
        .unwrap();
        assert_eq!(
            endpoint.required_model_names(),
            vec!["Subject", "Program", "ProviderRequest"]
        );
        assert_eq!(endpoint.http_method, "POST");
        assert!(endpoint.is_active);
        assert!(!endpoint.has_payload_template());
    }
}
