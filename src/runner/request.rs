//! Pieces of an attempt that do not touch any store: URL building, which
//! methods carry a rendered body, error detail text and token-error detection.

use crate::auth::is_auth_error_body;
use crate::constants::OperationCode;
use crate::error::{ClearanceError, Result};
use crate::models::ClearanceLink;
use crate::transport::TransportResponse;
use crate::utils::json::truncate_chars;

pub const ID_PLACEHOLDER: &str = "{id}";

/// Join base URL and path, substituting `{id}` when the path has one
pub fn build_url(base_url: &str, path_template: &str, id: Option<&str>) -> Result<String> {
    let base = base_url.trim().trim_end_matches('/');
    let path = path_template.trim().trim_start_matches('/');

    let path = if path.contains(ID_PLACEHOLDER) {
        let id = id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            ClearanceError::ValidationError(format!(
                "Path '{path_template}' needs an id but none is recorded"
            ))
        })?;
        path.replace(ID_PLACEHOLDER, id.trim())
    } else {
        path.to_string()
    };

    if path.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}/{path}"))
    }
}

/// Provider identifier that fills `{id}` for an operation
pub fn placeholder_id(operation: OperationCode, link: Option<&ClearanceLink>) -> Option<String> {
    let link = link?;
    match operation {
        OperationCode::GetClearanceStatus => link.request_id().map(str::to_string),
        op if op.addresses_response_id() => link.response_id().map(str::to_string),
        _ => None,
    }
}

pub fn carries_rendered_body(http_method: &str) -> bool {
    matches!(
        http_method.trim().to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "GET"
    )
}

/// `HTTP {code} | Error: {message} | Body: {body}`, each part truncated
pub fn error_details(response: &TransportResponse, max_chars: usize) -> String {
    let message = response
        .error
        .clone()
        .unwrap_or_else(|| "Provider returned a non-success status".to_string());
    format!(
        "HTTP {} | Error: {} | Body: {}",
        response.status_code,
        truncate_chars(&message, max_chars),
        truncate_chars(&response.body, max_chars)
    )
}

/// 401, or a 400 whose body talks about tokens
pub fn is_token_rejection(response: &TransportResponse) -> bool {
    response.status_code == 401 || (response.status_code == 400 && is_auth_error_body(&response.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn link(request: Option<&str>, response: Option<&str>) -> ClearanceLink {
        ClearanceLink {
            link_id: 1,
            subject_id: 7,
            program_id: 3,
            provider_code: "MEDX".into(),
            provider_request_id: request.map(str::to_string),
            provider_response_id: response.map(str::to_string),
            is_completed: false,
            retry_count: 0,
            requested_date: Utc::now(),
            completion_date: None,
            updated_on: Utc::now(),
        }
    }

    #[test]
    fn test_build_url_trims_slashes() {
        assert_eq!(
            build_url("https://p.test/api/", "/clearances", None).unwrap(),
            "https://p.test/api/clearances"
        );
        assert_eq!(build_url("https://p.test/", "", None).unwrap(), "https://p.test");
    }

    #[test]
    fn test_build_url_substitutes_id() {
        assert_eq!(
            build_url("https://p.test", "status/{id}", Some("R-99")).unwrap(),
            "https://p.test/status/R-99"
        );
        assert!(build_url("https://p.test", "status/{id}", None).is_err());
        assert!(build_url("https://p.test", "status/{id}", Some(" ")).is_err());
    }

    #[test]
    fn test_placeholder_id_by_operation() {
        let link = link(Some("R-1"), Some("C-9"));
        assert_eq!(
            placeholder_id(OperationCode::GetClearanceStatus, Some(&link)).as_deref(),
            Some("R-1")
        );
        assert_eq!(
            placeholder_id(OperationCode::AcknowledgeResponse, Some(&link)).as_deref(),
            Some("C-9")
        );
        assert_eq!(
            placeholder_id(OperationCode::SetStatusDelivered, Some(&link)).as_deref(),
            Some("C-9")
        );
        assert_eq!(placeholder_id(OperationCode::CreateClearanceRequest, Some(&link)), None);
    }

    #[test]
    fn test_error_details_format_and_truncation() {
        let response = TransportResponse {
            status_code: 500,
            body: "x".repeat(50),
            elapsed_ms: 12,
            error: None,
        };
        let details = error_details(&response, 10);
        assert_eq!(
            details,
            "HTTP 500 | Error: Provider r | Body: xxxxxxxxxx"
        );
    }

    #[test]
    fn test_token_rejection() {
        let response = |status_code: u16, body: &str| TransportResponse {
            status_code,
            body: body.to_string(),
            elapsed_ms: 0,
            error: None,
        };
        assert!(is_token_rejection(&response(401, "")));
        assert!(is_token_rejection(&response(400, r#"{"error":"expired_token"}"#)));
        assert!(!is_token_rejection(&response(400, r#"{"error":"bad date"}"#)));
        assert!(!is_token_rejection(&response(403, "access_denied")));
    }

    #[test]
    fn test_methods_with_rendered_bodies() {
        assert!(carries_rendered_body("post"));
        assert!(carries_rendered_body("GET"));
        assert!(!carries_rendered_body("DELETE"));
    }
}
