//! Tolerant multi-path field extraction from provider responses.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::providers::ProviderProtocol;
use crate::utils::json::{first_string, leaf_paths, lookup_path, parse_provider_date};

pub const REQUEST_ID_PATHS: &[&str] = &[
    "clearanceRequestId",
    "requestId",
    "data.requestId",
    "payload.requestId",
];

pub const RESPONSE_ID_PATHS: &[&str] = &[
    "clearanceResponseId",
    "responseId",
    "data.responseId",
    "payload.responseId",
    "resultId",
    "id",
    "caseId",
    "data.caseId",
    "payload.caseId",
];

pub const STATUS_PATHS: &[&str] = &["status", "clearanceStatus", "data.status", "payload.status"];

pub const STATUS_DATE_PATHS: &[&str] = &[
    "statusDate",
    "completionDate",
    "clearanceDate",
    "data.statusDate",
    "payload.statusDate",
];

pub const OUTCOME_PATHS: &[&str] = &["outcome", "data.outcome", "payload.outcome"];

/// How many body paths are logged when an extraction fails
pub const DIAGNOSTIC_PATH_LIMIT: usize = 20;

pub fn extract_request_id(body: &Value, protocol: &dyn ProviderProtocol) -> Option<String> {
    first_string(body, REQUEST_ID_PATHS)
        .or_else(|| first_string(body, protocol.request_id_paths()))
        .or_else(|| bare_string(body))
}

pub fn extract_response_id(body: &Value, protocol: &dyn ProviderProtocol) -> Option<String> {
    first_string(body, RESPONSE_ID_PATHS).or_else(|| first_string(body, protocol.response_id_paths()))
}

pub fn extract_status(body: &Value) -> Option<String> {
    first_string(body, STATUS_PATHS)
}

pub fn extract_status_date(body: &Value) -> Option<DateTime<Utc>> {
    STATUS_DATE_PATHS
        .iter()
        .filter_map(|path| lookup_path(body, path))
        .find_map(parse_provider_date)
}

pub fn extract_outcome(body: &Value) -> Option<String> {
    first_string(body, OUTCOME_PATHS)
}

/// Request id a status request was sent for, read from its logged body
pub fn request_id_in_request_body(request_body: Option<&str>) -> Option<String> {
    let body: Value = serde_json::from_str(request_body?).ok()?;
    first_string(&body, REQUEST_ID_PATHS)
}

/// A response that is nothing but a JSON string is taken as the identifier
fn bare_string(body: &Value) -> Option<String> {
    body.as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty() && !text.contains(char::is_whitespace))
        .map(str::to_string)
}

pub fn log_extraction_failure(what: &str, provider_code: &str, body: &Value) {
    warn!(
        provider = %provider_code,
        field = %what,
        available_paths = ?leaf_paths(body, DIAGNOSTIC_PATH_LIMIT),
        "Could not extract field from provider response"
    );
}
