//! Three-cycle providers: create, single-result status, acknowledge.
//!
//! Create responses carry `clearanceRequestId`; status responses concern exactly
//! the case that was asked about and carry `clearanceResponseId`, `status` and
//! `statusDate`. Our identity travels as `externalRequestId`.

use serde_json::{Map, Value};

use super::{date_text, text, EnrichmentInput, ProtocolKind, ProviderProtocol, StatusResultItem};

#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgedProtocol;

impl ProviderProtocol for AcknowledgedProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Acknowledged
    }

    fn request_id_paths(&self) -> &'static [&'static str] {
        &["clearanceRequest.clearanceRequestId", "data.clearanceRequestId"]
    }

    fn response_id_paths(&self) -> &'static [&'static str] {
        &["clearanceResponse.clearanceResponseId", "data.clearanceResponseId"]
    }

    fn reference_field(&self) -> &'static str {
        "externalRequestId"
    }

    fn is_batch_status(&self) -> bool {
        false
    }

    fn status_results(&self, _body: &Value) -> Vec<StatusResultItem> {
        Vec::new()
    }

    fn enrich(&self, input: &EnrichmentInput<'_>) -> Map<String, Value> {
        let subject = input.subject;
        let program = input.program;
        let mut fields = Map::new();

        fields.insert(
            "externalRequestId".into(),
            Value::String(input.reference_number().to_string()),
        );
        fields.insert("subjectId".into(), Value::from(input.subject_id));
        fields.insert("programId".into(), Value::from(input.program_id));
        fields.insert("indexNo".into(), text(subject.and_then(|s| s.index_no.as_deref())));
        fields.insert("firstName".into(), text(subject.map(|s| s.first_name.as_str())));
        fields.insert("middleName".into(), text(subject.and_then(|s| s.middle_name.as_deref())));
        fields.insert("lastName".into(), text(subject.map(|s| s.last_name.as_str())));
        fields.insert(
            "fullName".into(),
            Value::String(
                subject
                    .map(|s| {
                        [Some(s.first_name.as_str()), s.middle_name.as_deref(), Some(s.last_name.as_str())]
                            .into_iter()
                            .flatten()
                            .map(str::trim)
                            .filter(|part| !part.is_empty())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default(),
            ),
        );
        fields.insert(
            "dateOfBirth".into(),
            date_text(subject.and_then(|s| s.date_of_birth), "%Y-%m-%d"),
        );
        fields.insert("gender".into(), text(subject.and_then(|s| s.gender.as_deref())));
        fields.insert(
            "nationalityCode".into(),
            text(subject.and_then(|s| s.nationality_iso_code.as_deref())),
        );
        fields.insert(
            "countryOfBirthCode".into(),
            text(subject.and_then(|s| s.country_of_birth_iso_code.as_deref())),
        );
        fields.insert("emailAddress".into(), text(subject.and_then(|s| s.email_address.as_deref())));
        fields.insert("department".into(), text(program.and_then(|p| p.department.as_deref())));
        fields.insert(
            "dutyStation".into(),
            text(program.and_then(|p| p.duty_station_description.as_deref())),
        );
        fields.insert(
            "requestDate".into(),
            Value::String(input.now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        fields.insert(
            "clearanceRequestId".into(),
            text(input.link.and_then(|link| link.request_id())),
        );
        fields.insert(
            "clearanceResponseId".into(),
            text(input.link.and_then(|link| link.response_id())),
        );
        fields
    }

    fn mandatory_fields(&self) -> &'static [&'static str] {
        &["externalRequestId", "firstName", "lastName", "dateOfBirth"]
    }
}
