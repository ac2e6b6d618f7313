//! # Context Resolver
//!
//! Works out whose case an invocation belongs to. Invocations carry no foreign
//! keys, so on any execution after the first the (subject, program) pair has to be
//! rebuilt from the invocation's first logged request body. That is the identity
//! row written at creation ([`Bootstrap::identity_body`]) when there is one,
//! otherwise the first rendered payload.
//!
//! ## Resolution order
//!
//! 1. A bootstrap pair supplied by the caller, with a zero side filled in from the
//!    link table (most recent link wins) or the subject/program relation.
//! 2. Otherwise a key bag over the first logged request body, with the endpoint's
//!    key map applied, read for subject and program ids.
//! 3. The provider's composite reference field (`{program}_{subject}`) fills
//!    whatever is still missing; a program without a subject is joined against
//!    the subject/program relation.
//! 4. Provider identifiers found in the body are looked up in the link table.
//! 5. Finally the link table is consulted by whichever side is known.
//!
//! Failing all of that the invocation is [`ClearanceError::UnresolvableContext`],
//! a data problem that no retry will fix.

pub mod key_bag;
pub mod key_map;
pub mod reference;

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{ClearanceError, Result};
use crate::models::Invocation;
use crate::providers::ProviderRegistry;
use crate::store::{EndpointCatalog, Stores};

pub use key_bag::{KeyBag, KeyBagRules, SpecialField};
pub use key_map::KeyMap;
pub use reference::ReferenceNumber;

const SUBJECT_FIELDS: &[&str] = &["SubjectId", "subject_id"];
const PROGRAM_FIELDS: &[&str] = &["ProgramId", "program_id"];
const REFERENCE_FIELDS: &[&str] = &["ReferenceNumber", "externalRequestId"];
const PROVIDER_ID_FIELDS: &[&str] = &[
    "clearanceRequestId",
    "requestId",
    "clearanceResponseId",
    "responseId",
    "id",
];

/// Ids supplied directly by the caller on a first execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bootstrap {
    pub subject_id: i64,
    pub program_id: i64,
}

impl Bootstrap {
    pub fn new(subject_id: i64, program_id: i64) -> Self {
        Self {
            subject_id,
            program_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject_id <= 0 && self.program_id <= 0
    }

    /// `{"SubjectId": .., "ProgramId": ..}` with only the known sides
    pub fn identity_body(&self) -> String {
        let mut body = Map::new();
        if self.subject_id > 0 {
            body.insert(SUBJECT_FIELDS[0].to_string(), Value::from(self.subject_id));
        }
        if self.program_id > 0 {
            body.insert(PROGRAM_FIELDS[0].to_string(), Value::from(self.program_id));
        }
        Value::Object(body).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Bootstrap,
    RequestBody,
    LinkTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedContext {
    pub subject_id: i64,
    pub program_id: i64,
    pub source: ResolutionSource,
}

/// Ids read out of a body before any store lookups; either side may be zero
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialIdentity {
    pub subject_id: i64,
    pub program_id: i64,
    /// Provider identifiers present in the body
    pub provider_ids: Vec<String>,
}

impl PartialIdentity {
    pub fn is_complete(&self) -> bool {
        self.subject_id > 0 && self.program_id > 0
    }
}

pub struct ContextResolver {
    stores: Stores,
    catalog: Arc<dyn EndpointCatalog>,
    providers: Arc<ProviderRegistry>,
    rules: KeyBagRules,
}

impl ContextResolver {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn EndpointCatalog>,
        providers: Arc<ProviderRegistry>,
        rules: KeyBagRules,
    ) -> Self {
        Self {
            stores,
            catalog,
            providers,
            rules,
        }
    }

    #[instrument(skip(self, invocation), fields(invocation_id = invocation.invocation_id, provider = %invocation.provider_code))]
    pub async fn resolve(
        &self,
        invocation: &Invocation,
        bootstrap: Option<Bootstrap>,
    ) -> Result<ResolvedContext> {
        match bootstrap {
            Some(bootstrap) if !bootstrap.is_empty() => {
                self.resolve_bootstrap(&invocation.provider_code, bootstrap)
                    .await
            }
            _ => self.reconstruct(invocation).await,
        }
    }

    async fn resolve_bootstrap(
        &self,
        provider_code: &str,
        bootstrap: Bootstrap,
    ) -> Result<ResolvedContext> {
        let mut subject_id = bootstrap.subject_id.max(0);
        let mut program_id = bootstrap.program_id.max(0);

        if subject_id == 0 {
            subject_id = self.subject_for_program(program_id, provider_code).await?;
        }
        if program_id == 0 {
            program_id = self.program_for_subject(subject_id, provider_code).await?;
        }

        if subject_id > 0 && program_id > 0 {
            Ok(ResolvedContext {
                subject_id,
                program_id,
                source: ResolutionSource::Bootstrap,
            })
        } else {
            Err(ClearanceError::UnresolvableContext(format!(
                "Bootstrap subject={} program={} could not be completed for {provider_code}",
                bootstrap.subject_id, bootstrap.program_id
            )))
        }
    }

    async fn reconstruct(&self, invocation: &Invocation) -> Result<ResolvedContext> {
        let invocation_id = invocation.invocation_id;
        let provider_code = invocation.provider_code.as_str();

        let body = self
            .stores
            .logs
            .first_request_body(invocation_id)
            .await?
            .ok_or_else(|| {
                ClearanceError::UnresolvableContext(format!(
                    "Invocation {invocation_id} has no logged request body"
                ))
            })?;
        let json: Value = serde_json::from_str(&body).map_err(|e| {
            ClearanceError::UnresolvableContext(format!(
                "First request body of invocation {invocation_id} is not JSON: {e}"
            ))
        })?;

        let key_map = match self
            .catalog
            .active_endpoint(provider_code, invocation.operation_code)
            .await?
        {
            Some(endpoint) => KeyMap::derive(&endpoint.payload_template),
            None => KeyMap::new(),
        };

        let mut identity = self.extract_identity(provider_code, &json, &key_map);
        debug!(
            subject_id = identity.subject_id,
            program_id = identity.program_id,
            provider_ids = identity.provider_ids.len(),
            "Extracted identity from request body"
        );

        if identity.subject_id == 0 && identity.program_id > 0 {
            if let Some(program) = self
                .stores
                .directory
                .find_program(identity.program_id)
                .await?
            {
                identity.subject_id = program.subject_id;
            }
        }

        let mut source = ResolutionSource::RequestBody;
        if !identity.is_complete() {
            for provider_id in &identity.provider_ids {
                let link = match self.stores.links.find_by_request_id(provider_id).await? {
                    Some(link) => Some(link),
                    None => self.stores.links.find_by_response_id(provider_id).await?,
                };
                if let Some(link) = link {
                    if identity.subject_id == 0 {
                        identity.subject_id = link.subject_id;
                    }
                    if identity.program_id == 0 {
                        identity.program_id = link.program_id;
                    }
                    source = ResolutionSource::LinkTable;
                    break;
                }
            }
        }

        if !identity.is_complete() && (identity.subject_id > 0 || identity.program_id > 0) {
            source = ResolutionSource::LinkTable;
            if identity.subject_id == 0 {
                identity.subject_id = self
                    .subject_for_program(identity.program_id, provider_code)
                    .await?;
            }
            if identity.program_id == 0 {
                identity.program_id = self
                    .program_for_subject(identity.subject_id, provider_code)
                    .await?;
            }
        }

        if identity.is_complete() {
            Ok(ResolvedContext {
                subject_id: identity.subject_id,
                program_id: identity.program_id,
                source,
            })
        } else {
            warn!(
                invocation_id,
                provider = %provider_code,
                subject_id = identity.subject_id,
                program_id = identity.program_id,
                "Could not reconstruct context from first request body"
            );
            Err(ClearanceError::UnresolvableContext(format!(
                "Invocation {invocation_id}: subject={} program={} after reconstruction",
                identity.subject_id, identity.program_id
            )))
        }
    }

    /// Pure extraction step: key bag, key map and composite reference decoding,
    /// without touching any store.
    pub fn extract_identity(
        &self,
        provider_code: &str,
        body: &Value,
        key_map: &KeyMap,
    ) -> PartialIdentity {
        let mut bag = KeyBag::collect(body, &self.rules, &key_map.external_names());
        key_map.apply(&mut bag);

        let mut identity = PartialIdentity {
            subject_id: bag.first_positive_i64(SUBJECT_FIELDS).unwrap_or(0),
            program_id: bag.first_positive_i64(PROGRAM_FIELDS).unwrap_or(0),
            provider_ids: Vec::new(),
        };

        if !identity.is_complete() {
            let protocol_field = self
                .providers
                .get(provider_code)
                .map(|protocol| protocol.reference_field());
            let reference = protocol_field
                .into_iter()
                .chain(REFERENCE_FIELDS.iter().copied())
                .filter_map(|field| bag.get_string(field))
                .find_map(|text| ReferenceNumber::decode(&text));

            if let Some(reference) = reference {
                if identity.program_id == 0 {
                    identity.program_id = reference.program_id;
                }
                if identity.subject_id == 0 && reference.has_subject() {
                    identity.subject_id = reference.subject_id;
                }
            }
        }

        identity.provider_ids = PROVIDER_ID_FIELDS
            .iter()
            .filter_map(|field| bag.get_string(field))
            .fold(Vec::new(), |mut ids, id| {
                if !ids.contains(&id) {
                    ids.push(id);
                }
                ids
            });

        identity
    }

    /// Subject of a program: most recent link first, then the relation itself
    async fn subject_for_program(&self, program_id: i64, provider_code: &str) -> Result<i64> {
        if program_id <= 0 {
            return Ok(0);
        }
        if let Some(link) = self
            .stores
            .links
            .latest_link_for_program(program_id, Some(provider_code))
            .await?
        {
            return Ok(link.subject_id);
        }
        Ok(self
            .stores
            .directory
            .find_program(program_id)
            .await?
            .map(|program| program.subject_id)
            .unwrap_or(0))
    }

    /// Program of a subject: most recent link first, then the latest program
    async fn program_for_subject(&self, subject_id: i64, provider_code: &str) -> Result<i64> {
        if subject_id <= 0 {
            return Ok(0);
        }
        if let Some(link) = self
            .stores
            .links
            .latest_link_for_subject(subject_id, Some(provider_code))
            .await?
        {
            return Ok(link.program_id);
        }
        Ok(self
            .stores
            .directory
            .latest_program_for_subject(subject_id)
            .await?
            .map(|program| program.program_id)
            .unwrap_or(0))
    }
}
