//! Two-cycle providers whose status endpoint reports many cases at once.
//!
//! Create responses look like `{"IsSuccess": true, "Result": {"Id": 981}}`; status
//! responses list `{"Id", "IndexNumber", "ReferenceNumber", "ClearanceStatus",
//! "ClearanceDate"}` entries under `Result`. Each entry is matched back to a case
//! through its `ReferenceNumber`.

use serde_json::{Map, Value};

use super::{date_text, text, EnrichmentInput, ProtocolKind, ProviderProtocol, StatusResultItem};
use crate::error::{ClearanceError, Result};
use crate::resolver::ReferenceNumber;
use crate::utils::json::{parse_provider_date, scalar_i64, scalar_string};

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchedProtocol;

impl ProviderProtocol for BatchedProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Batched
    }

    fn request_id_paths(&self) -> &'static [&'static str] {
        &["Result.Id", "Result[0].Id"]
    }

    fn response_id_paths(&self) -> &'static [&'static str] {
        &["Result[0].Id"]
    }

    fn reference_field(&self) -> &'static str {
        "ReferenceNumber"
    }

    fn check_create_response(&self, body: &Value) -> Result<()> {
        let flagged = body
            .as_object()
            .and_then(|object| {
                object
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case("IsSuccess"))
            })
            .and_then(|(_, value)| value.as_bool());
        match flagged {
            Some(false) => Err(ClearanceError::InvalidProviderResponse(
                "Provider reported IsSuccess=false".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn is_batch_status(&self) -> bool {
        true
    }

    fn status_results(&self, body: &Value) -> Vec<StatusResultItem> {
        let entries: Vec<&Value> = match body.get("Result").or_else(|| body.get("result")) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        };

        entries
            .into_iter()
            .filter_map(Value::as_object)
            .map(|entry| StatusResultItem {
                response_id: entry.get("Id").and_then(scalar_string),
                reference: entry
                    .get("ReferenceNumber")
                    .and_then(Value::as_str)
                    .and_then(ReferenceNumber::decode),
                index_number: entry.get("IndexNumber").and_then(scalar_i64),
                status: entry.get("ClearanceStatus").and_then(scalar_string),
                status_date: entry.get("ClearanceDate").and_then(parse_provider_date),
            })
            .collect()
    }

    fn enrich(&self, input: &EnrichmentInput<'_>) -> Map<String, Value> {
        let subject = input.subject;
        let program = input.program;
        let mut fields = Map::new();

        let index_number = subject
            .and_then(|s| s.index_no.clone())
            .filter(|index| !index.trim().is_empty())
            .unwrap_or_else(|| input.subject_id.to_string());

        fields.insert(
            "ReferenceNumber".into(),
            Value::String(input.reference_number().to_string()),
        );
        fields.insert("IndexNumber".into(), Value::String(index_number));
        fields.insert("FirstName".into(), text(subject.map(|s| s.first_name.as_str())));
        fields.insert("MiddleName".into(), text(subject.and_then(|s| s.middle_name.as_deref())));
        fields.insert("LastName".into(), text(subject.map(|s| s.last_name.as_str())));
        fields.insert(
            "DateOfBirth".into(),
            date_text(subject.and_then(|s| s.date_of_birth), "%Y-%m-%d"),
        );
        fields.insert("Gender".into(), text(subject.and_then(|s| s.gender.as_deref())));
        fields.insert(
            "NationalityCode".into(),
            text(subject.and_then(|s| s.nationality_iso_code.as_deref())),
        );
        fields.insert("EmailAddress".into(), text(subject.and_then(|s| s.email_address.as_deref())));
        fields.insert("EmployeeType".into(), text(program.and_then(|p| p.employee_type.as_deref())));
        fields.insert("Organization".into(), text(program.and_then(|p| p.department.as_deref())));
        fields.insert(
            "FunctionalTitleDescription".into(),
            text(program.and_then(|p| p.functional_title.as_deref())),
        );
        fields.insert(
            "DutyStationCode".into(),
            text(program.and_then(|p| p.duty_station_code.as_deref())),
        );
        fields.insert(
            "DutyStationDescription".into(),
            text(program.and_then(|p| p.duty_station_description.as_deref())),
        );
        fields.insert(
            "StartDate".into(),
            date_text(program.and_then(|p| p.start_date), "%Y-%m-%d"),
        );
        fields.insert(
            "EndDate".into(),
            date_text(program.and_then(|p| p.end_date), "%Y-%m-%d"),
        );
        fields.insert(
            "RequestDate".into(),
            Value::String(input.now.format("%Y-%m-%d").to_string()),
        );
        fields
    }

    fn mandatory_fields(&self) -> &'static [&'static str] {
        &["ReferenceNumber", "IndexNumber", "FirstName", "LastName", "DateOfBirth"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_results_decode_each_entry() {
        let body = json!({
            "IsSuccess": true,
            "Result": [
                {"Id": 501, "IndexNumber": "7", "ReferenceNumber": "3_7", "ClearanceStatus": "Fit", "ClearanceDate": "2026-02-01T00:00:00"},
                {"Id": 502, "IndexNumber": "x", "ReferenceNumber": "bad"}
            ]
        });
        let results = BatchedProtocol.status_results(&body);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].response_id.as_deref(), Some("501"));
        assert_eq!(results[0].reference, Some(ReferenceNumber::new(3, 7)));
        assert_eq!(results[0].index_number, Some(7));
        assert!(results[0].status_date.is_some());
        assert_eq!(results[1].reference, None);
        assert_eq!(results[1].index_number, None);
    }

    #[test]
    fn test_single_result_object_is_accepted() {
        let results = BatchedProtocol.status_results(&json!({"Result": {"Id": 9}}));
        assert_eq!(results.len(), 1);
        assert!(BatchedProtocol.status_results(&json!({"Result": null})).is_empty());
    }

    #[test]
    fn test_create_response_flagged_unsuccessful() {
        assert!(BatchedProtocol
            .check_create_response(&json!({"IsSuccess": false, "Result": {"Id": 1}}))
            .is_err());
        assert!(BatchedProtocol
            .check_create_response(&json!({"Result": {"Id": 1}}))
            .is_ok());
    }
}
