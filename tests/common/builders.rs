//! Fixture builders for providers, endpoints and directory records.

use chrono::{NaiveDate, Utc};

use clearance_core::auth::AuthSettings;
use clearance_core::config::ProviderConfig;
use clearance_core::constants::OperationCode;
use clearance_core::models::{EndpointDefinition, Program, Subject};
use clearance_core::providers::ProtocolKind;

pub const IDENTITY_TEMPLATE: &str =
    r#"{"SubjectId": {{SubjectId}}, "ProgramId": {{ProgramId}}, "ProviderCode": "{{ProviderCode}}"}"#;

pub fn provider(code: &str, protocol: ProtocolKind) -> ProviderConfig {
    ProviderConfig {
        code: code.to_string(),
        protocol,
        auth: AuthSettings::default(),
    }
}

pub fn authenticated_provider(code: &str, protocol: ProtocolKind) -> ProviderConfig {
    ProviderConfig {
        code: code.to_string(),
        protocol,
        auth: AuthSettings {
            requires_authentication: true,
            token_url: "https://auth.test/token".to_string(),
            client_id: "uvp".to_string(),
            client_secret: "secret".to_string(),
            ..AuthSettings::default()
        },
    }
}

pub struct EndpointBuilder {
    endpoint: EndpointDefinition,
}

impl EndpointBuilder {
    pub fn new(provider_code: &str, operation_code: OperationCode) -> Self {
        Self {
            endpoint: EndpointDefinition {
                endpoint_id: 0,
                provider_code: provider_code.to_string(),
                operation_code,
                base_url: format!("https://{}.provider.test/api", provider_code.to_ascii_lowercase()),
                path_template: String::new(),
                http_method: "POST".to_string(),
                timeout_seconds: 10,
                payload_template: IDENTITY_TEMPLATE.to_string(),
                required_models: String::new(),
                retrigger: true,
                retrigger_count: 3,
                retrigger_interval_minutes: 1,
                is_active: true,
            },
        }
    }

    pub fn path(mut self, path_template: &str) -> Self {
        self.endpoint.path_template = path_template.to_string();
        self
    }

    pub fn method(mut self, http_method: &str) -> Self {
        self.endpoint.http_method = http_method.to_string();
        self
    }

    pub fn template(mut self, payload_template: &str) -> Self {
        self.endpoint.payload_template = payload_template.to_string();
        self
    }

    pub fn models(mut self, required_models: &str) -> Self {
        self.endpoint.required_models = required_models.to_string();
        self
    }

    pub fn retries(mut self, retrigger_count: i32, interval_minutes: i32) -> Self {
        self.endpoint.retrigger = true;
        self.endpoint.retrigger_count = retrigger_count;
        self.endpoint.retrigger_interval_minutes = interval_minutes;
        self
    }

    pub fn build(self) -> EndpointDefinition {
        self.endpoint
    }
}

pub fn subject(subject_id: i64, first_name: &str, last_name: &str) -> Subject {
    Subject {
        subject_id,
        index_no: Some(format!("IDX{subject_id}")),
        first_name: first_name.to_string(),
        middle_name: None,
        last_name: last_name.to_string(),
        gender: Some("F".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12),
        nationality: Some("Kenya".to_string()),
        nationality_iso_code: Some("KE".to_string()),
        country_of_birth: Some("Kenya".to_string()),
        country_of_birth_iso_code: Some("KE".to_string()),
        email_address: Some(format!("subject{subject_id}@example.org")),
    }
}

pub fn program(program_id: i64, subject_id: i64) -> Program {
    Program {
        program_id,
        subject_id,
        deployment_id: None,
        department: Some("Field Operations".to_string()),
        requestor_name: None,
        requestor_email: None,
        employee_type: Some("Volunteer".to_string()),
        functional_title: Some("Logistics Officer".to_string()),
        duty_station_code: Some("NBO".to_string()),
        duty_station_description: Some("Nairobi".to_string()),
        start_date: NaiveDate::from_ymd_opt(2026, 11, 1),
        end_date: NaiveDate::from_ymd_opt(2027, 10, 31),
        requested_on: Utc::now(),
    }
}
