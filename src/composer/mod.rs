//! # Request Composer
//!
//! Builds the named data bundle a provider's payload template is rendered
//! against: the raw sub-models an endpoint asks for, each with casing aliases,
//! plus the provider's synthetic `ProviderRequest` sub-model.
//!
//! Missing records are logged and skipped. Blank mandatory fields are logged
//! and never block the request; the provider is the real validator.

pub mod aliases;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::constants::{models, OperationCode};
use crate::error::{ClearanceError, Result};
use crate::models::{ClearanceLink, EndpointDefinition};
use crate::providers::{EnrichmentInput, ProviderRegistry};
use crate::store::{EndpointCatalog, Stores};

/// Model name to serialized record
pub type DataBundle = BTreeMap<String, Value>;

const DEFAULT_MODELS: &[&str] = &[
    models::SUBJECT,
    models::PROGRAM,
    models::CLEARANCE_LINK,
    models::CLEARANCE,
    models::INTEGRATION,
];

pub struct RequestComposer {
    stores: Stores,
    catalog: Arc<dyn EndpointCatalog>,
    providers: Arc<ProviderRegistry>,
}

impl RequestComposer {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn EndpointCatalog>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            stores,
            catalog,
            providers,
        }
    }

    /// Compose for a (provider, operation) pair by looking its endpoint up first
    pub async fn compose(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
        subject_id: i64,
        program_id: i64,
    ) -> Result<DataBundle> {
        let endpoint = self
            .catalog
            .active_endpoint(provider_code, operation_code)
            .await?
            .ok_or_else(|| ClearanceError::endpoint_not_found(provider_code, operation_code.as_str()))?;
        self.compose_for(&endpoint, subject_id, program_id).await
    }

    #[instrument(skip(self, endpoint), fields(provider = %endpoint.provider_code, operation = %endpoint.operation_code))]
    pub async fn compose_for(
        &self,
        endpoint: &EndpointDefinition,
        subject_id: i64,
        program_id: i64,
    ) -> Result<DataBundle> {
        let provider_code = endpoint.provider_code.as_str();
        let directory = &self.stores.directory;

        let subject = directory.find_subject(subject_id).await?;
        let program = directory.find_program(program_id).await?;
        let link = self.current_link(subject_id, program_id, provider_code).await?;
        let clearance = self
            .stores
            .clearances
            .find_clearance(subject_id, provider_code)
            .await?;

        let requested = endpoint.required_model_names();
        let wanted: Vec<&str> = if requested.is_empty() {
            DEFAULT_MODELS.to_vec()
        } else {
            requested.iter().map(String::as_str).collect()
        };

        let mut bundle = DataBundle::new();
        for name in wanted {
            let record = match name {
                n if n.eq_ignore_ascii_case(models::SUBJECT) => to_object(subject.as_ref())?,
                n if n.eq_ignore_ascii_case(models::PROGRAM) => to_object(program.as_ref())?,
                n if n.eq_ignore_ascii_case(models::CLEARANCE_LINK) => to_object(link.as_ref())?,
                n if n.eq_ignore_ascii_case(models::CLEARANCE) => to_object(clearance.as_ref())?,
                n if n.eq_ignore_ascii_case(models::INTEGRATION) => json!({
                    "provider_code": provider_code,
                    "operation_code": endpoint.operation_code.as_str(),
                })
                .as_object()
                .cloned(),
                // built below for every registered provider
                n if n.eq_ignore_ascii_case(models::PROVIDER_REQUEST) => continue,
                other => {
                    warn!(model = %other, provider = %provider_code, "Unknown data model requested by endpoint");
                    continue;
                }
            };

            match record {
                Some(fields) => insert_model(&mut bundle, name, aliases::with_aliases(&fields)),
                None => {
                    warn!(
                        model = %name,
                        provider = %provider_code,
                        subject_id,
                        program_id,
                        "Data model not found, skipping"
                    );
                }
            }
        }

        match self.providers.get(provider_code) {
            Some(protocol) => {
                let input = EnrichmentInput {
                    provider_code,
                    subject_id,
                    program_id,
                    subject: subject.as_ref(),
                    program: program.as_ref(),
                    link: link.as_ref(),
                    now: Utc::now(),
                };
                let provider_request = protocol.enrich(&input);
                let blank = blank_fields(&provider_request, protocol.mandatory_fields());
                if !blank.is_empty() {
                    warn!(
                        provider = %provider_code,
                        subject_id,
                        program_id,
                        fields = ?blank,
                        "Mandatory provider fields are blank"
                    );
                }
                insert_model(&mut bundle, models::PROVIDER_REQUEST, provider_request);
            }
            None => {
                warn!(provider = %provider_code, "No enrichment for unregistered provider");
            }
        }

        for (name, value) in [
            ("SubjectId", subject_id),
            ("ProgramId", program_id),
            ("subjectId", subject_id),
            ("programId", program_id),
        ] {
            bundle.insert(name.to_string(), Value::from(value));
        }
        bundle.insert("ProviderCode".to_string(), Value::from(provider_code));

        debug!(models = bundle.len(), "Composed data bundle");
        Ok(bundle)
    }

    /// The open link for the pair, else the most recent link of the subject
    async fn current_link(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<Option<ClearanceLink>> {
        if let Some(link) = self
            .stores
            .links
            .find_open_link(subject_id, program_id, provider_code)
            .await?
        {
            return Ok(Some(link));
        }
        self.stores
            .links
            .latest_link_for_subject(subject_id, Some(provider_code))
            .await
    }
}

fn to_object<T: Serialize>(record: Option<&T>) -> Result<Option<Map<String, Value>>> {
    match record {
        Some(record) => match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Some(fields)),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

/// Insert under the model name and its camelCase form (`ProviderRequest`, `providerRequest`)
fn insert_model(bundle: &mut DataBundle, name: &str, fields: Map<String, Value>) {
    let canonical = canonical_model_name(name);
    let lower_first = aliases::camel_case(&canonical);
    let value = Value::Object(fields);
    if lower_first != canonical {
        bundle.insert(lower_first, value.clone());
    }
    bundle.insert(canonical, value);
}

fn canonical_model_name(name: &str) -> String {
    [
        models::SUBJECT,
        models::PROGRAM,
        models::CLEARANCE_LINK,
        models::CLEARANCE,
        models::INTEGRATION,
        models::PROVIDER_REQUEST,
    ]
    .iter()
    .find(|known| known.eq_ignore_ascii_case(name))
    .map(|known| known.to_string())
    .unwrap_or_else(|| name.to_string())
}

/// Mandatory fields that are missing or blank
pub fn blank_fields(fields: &Map<String, Value>, mandatory: &[&str]) -> Vec<String> {
    mandatory
        .iter()
        .filter(|name| match fields.get(**name) {
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Null) | None => true,
            Some(_) => false,
        })
        .map(|name| name.to_string())
        .collect()
}
