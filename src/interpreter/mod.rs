//! # Response Interpreter
//!
//! Turns a successful provider response into clearance progress, dispatched by
//! the invocation's operation:
//!
//! - **create**: record the provider request id on a new clearance link and put
//!   the clearance summary at REQUESTED
//! - **status**: complete the matching link(s) and advance the summary to the
//!   protocol's completion code; batch responses are matched case by case and
//!   unmatched cases are skipped
//! - **acknowledge**: advance three-cycle clearances to DELIVERED; a no-op for
//!   two-cycle providers
//!
//! The response body is already in the invocation log when this runs, so an
//! unregistered provider or an unusable body loses nothing.

pub mod extractor;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::constants::{OperationCode, OUTCOME_COMPLETE, REMARK_ACKNOWLEDGED};
use crate::error::{ClearanceError, Result};
use crate::models::{ClearanceAdvance, ClearanceLink, Invocation, LinkCompletion, NewClearanceLink};
use crate::providers::{ProviderProtocol, ProviderRegistry, StatusResultItem};
use crate::state_machine::ClearanceStatus;
use crate::store::Stores;

/// What the interpreter needs to know about one finished exchange
#[derive(Debug, Clone, Copy)]
pub struct InterpretRequest<'a> {
    pub invocation: &'a Invocation,
    pub response_body: &'a str,
    /// Body this attempt sent, if any
    pub request_body: Option<&'a str>,
    pub subject_id: i64,
    pub program_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretOutcome {
    RequestRecorded { request_id: String },
    StatusApplied { completed: usize, skipped: usize },
    /// Status response without a result for the case yet
    StillOpen,
    Acknowledged,
    NoEffect,
}

impl InterpretOutcome {
    /// A batch status counts only when at least one case was processed
    pub fn succeeded(&self) -> bool {
        match self {
            Self::StatusApplied { completed, .. } => *completed > 0,
            _ => true,
        }
    }
}

pub struct ResponseInterpreter {
    stores: Stores,
    providers: Arc<ProviderRegistry>,
}

impl ResponseInterpreter {
    pub fn new(stores: Stores, providers: Arc<ProviderRegistry>) -> Self {
        Self { stores, providers }
    }

    #[instrument(skip(self, request), fields(
        invocation_id = request.invocation.invocation_id,
        provider = %request.invocation.provider_code,
        operation = %request.invocation.operation_code,
        subject_id = request.subject_id,
        program_id = request.program_id,
    ))]
    pub async fn interpret(&self, request: InterpretRequest<'_>) -> Result<InterpretOutcome> {
        let provider_code = request.invocation.provider_code.as_str();
        let Some(protocol) = self.providers.get(provider_code) else {
            warn!(provider = %provider_code, "No protocol registered for provider; response left in log");
            return Ok(InterpretOutcome::NoEffect);
        };

        let body = parse_body(request.response_body)?;
        let outcome = match request.invocation.operation_code {
            OperationCode::CreateClearanceRequest => {
                self.record_request(&request, protocol.as_ref(), &body).await?
            }
            OperationCode::GetClearanceStatus if protocol.is_batch_status() => {
                self.apply_batch_status(provider_code, protocol.as_ref(), &body)
                    .await?
            }
            OperationCode::GetClearanceStatus => {
                self.apply_single_status(&request, protocol.as_ref(), &body)
                    .await?
            }
            OperationCode::AcknowledgeResponse | OperationCode::SetStatusDelivered => {
                self.acknowledge(&request, protocol.as_ref()).await?
            }
        };

        debug!(outcome = ?outcome, "Response interpreted");
        Ok(outcome)
    }

    async fn record_request(
        &self,
        request: &InterpretRequest<'_>,
        protocol: &dyn ProviderProtocol,
        body: &Value,
    ) -> Result<InterpretOutcome> {
        let provider_code = request.invocation.provider_code.as_str();
        protocol.check_create_response(body)?;

        let Some(request_id) = extractor::extract_request_id(body, protocol) else {
            extractor::log_extraction_failure("request id", provider_code, body);
            return Err(ClearanceError::InvalidProviderResponse(format!(
                "No request id in {provider_code} create response"
            )));
        };

        match self
            .stores
            .links
            .find_open_link(request.subject_id, request.program_id, provider_code)
            .await?
        {
            Some(existing) if existing.request_id() == Some(request_id.as_str()) => {
                debug!(link_id = existing.link_id, "Link already records this request id");
            }
            Some(existing) => {
                warn!(
                    link_id = existing.link_id,
                    recorded = ?existing.provider_request_id,
                    received = %request_id,
                    "Open link already holds a different request id; keeping the original"
                );
                return Err(ClearanceError::Conflict(format!(
                    "Open {provider_code} link for subject {} already exists",
                    request.subject_id
                )));
            }
            None => {
                let link = self
                    .stores
                    .links
                    .insert_link(NewClearanceLink {
                        subject_id: request.subject_id,
                        program_id: request.program_id,
                        provider_code: provider_code.to_string(),
                        provider_request_id: request_id.clone(),
                    })
                    .await?;
                info!(link_id = link.link_id, request_id = %request_id, "Clearance link created");
            }
        }

        self.stores
            .clearances
            .record_requested(
                request.subject_id,
                provider_code,
                &format!("clearanceRequestId={request_id}"),
                Utc::now(),
            )
            .await?;

        Ok(InterpretOutcome::RequestRecorded { request_id })
    }

    async fn apply_single_status(
        &self,
        request: &InterpretRequest<'_>,
        protocol: &dyn ProviderProtocol,
        body: &Value,
    ) -> Result<InterpretOutcome> {
        let provider_code = request.invocation.provider_code.as_str();

        let Some(response_id) = extractor::extract_response_id(body, protocol) else {
            info!(status = ?extractor::extract_status(body), "Clearance not yet completed by provider");
            return Ok(InterpretOutcome::StillOpen);
        };

        let link = match extractor::request_id_in_request_body(request.request_body) {
            Some(request_id) => {
                self.stores
                    .links
                    .find_open_by_request_id(provider_code, &request_id)
                    .await?
            }
            None => None,
        };
        let link = match link {
            Some(link) => link,
            None => self
                .stores
                .links
                .find_open_link(request.subject_id, request.program_id, provider_code)
                .await?
                .ok_or_else(|| {
                    ClearanceError::UnresolvableContext(format!(
                        "No open {provider_code} link for subject {} program {}",
                        request.subject_id, request.program_id
                    ))
                })?,
        };

        let status_date = extractor::extract_status_date(body);
        let outcome = extractor::extract_outcome(body);
        self.complete(&link, protocol, response_id, status_date, outcome)
            .await?;
        Ok(InterpretOutcome::StatusApplied {
            completed: 1,
            skipped: 0,
        })
    }

    async fn apply_batch_status(
        &self,
        provider_code: &str,
        protocol: &dyn ProviderProtocol,
        body: &Value,
    ) -> Result<InterpretOutcome> {
        let results = protocol.status_results(body);
        if results.is_empty() {
            extractor::log_extraction_failure("status results", provider_code, body);
            return Err(ClearanceError::InvalidProviderResponse(format!(
                "{provider_code} status response lists no results"
            )));
        }

        let mut completed = 0;
        let mut skipped = 0;
        for item in &results {
            let link = match self.match_status_item(provider_code, item).await {
                Ok(Some(link)) => link,
                Ok(None) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, response_id = ?item.response_id, "Failed to match status result");
                    skipped += 1;
                    continue;
                }
            };

            let Some(response_id) = item.response_id.clone() else {
                warn!(link_id = link.link_id, "Status result has no identifier, skipping");
                skipped += 1;
                continue;
            };

            match self
                .complete(&link, protocol, response_id, item.status_date, None)
                .await
            {
                Ok(()) => completed += 1,
                Err(e) => {
                    warn!(link_id = link.link_id, error = %e, "Failed to apply status result");
                    skipped += 1;
                }
            }
        }

        info!(
            provider = %provider_code,
            results = results.len(),
            completed,
            skipped,
            "Batch status processed"
        );
        Ok(InterpretOutcome::StatusApplied { completed, skipped })
    }

    /// Open link a batch result belongs to. The composite reference decides;
    /// the index number is used only when it points at exactly one open link.
    async fn match_status_item(
        &self,
        provider_code: &str,
        item: &StatusResultItem,
    ) -> Result<Option<ClearanceLink>> {
        if let Some(reference) = item.reference {
            let subject_id = if reference.has_subject() {
                reference.subject_id
            } else {
                self.stores
                    .directory
                    .find_program(reference.program_id)
                    .await?
                    .map(|program| program.subject_id)
                    .unwrap_or(0)
            };
            let link = self
                .stores
                .links
                .find_open_link(subject_id, reference.program_id, provider_code)
                .await?;
            if link.is_none() {
                debug!(reference = %reference, "No open link for status result");
            }
            return Ok(link);
        }

        if let Some(subject_id) = item.index_number.filter(|id| *id > 0) {
            let mut open = self
                .stores
                .links
                .open_links_for_subject(subject_id, provider_code)
                .await?;
            if open.len() == 1 {
                return Ok(open.pop());
            }
            if open.len() > 1 {
                warn!(subject_id, open_links = open.len(), "Index number matches several open links");
            }
        }
        Ok(None)
    }

    /// Complete a link and advance its clearance summary
    async fn complete(
        &self,
        link: &ClearanceLink,
        protocol: &dyn ProviderProtocol,
        response_id: String,
        status_date: Option<DateTime<Utc>>,
        outcome: Option<String>,
    ) -> Result<()> {
        if link.is_completed {
            debug!(link_id = link.link_id, "Link already completed");
            return Ok(());
        }

        let completion_date = status_date.unwrap_or_else(Utc::now);
        self.stores
            .links
            .complete_link(
                link.link_id,
                LinkCompletion {
                    provider_response_id: Some(response_id.clone()),
                    completion_date,
                },
            )
            .await?;

        let mut advance = ClearanceAdvance::to(protocol.completion_status())
            .with_remark(format!("clearanceResponseId={response_id}"));
        if !protocol.has_acknowledge_cycle() {
            advance = advance.completed(
                outcome.unwrap_or_else(|| OUTCOME_COMPLETE.to_string()),
                completion_date,
            );
        }
        self.advance_summary(link.subject_id, &link.provider_code, advance)
            .await?;

        info!(
            link_id = link.link_id,
            subject_id = link.subject_id,
            program_id = link.program_id,
            response_id = %response_id,
            "Clearance link completed"
        );
        Ok(())
    }

    async fn acknowledge(
        &self,
        request: &InterpretRequest<'_>,
        protocol: &dyn ProviderProtocol,
    ) -> Result<InterpretOutcome> {
        let provider_code = request.invocation.provider_code.as_str();
        if !protocol.has_acknowledge_cycle() {
            info!(provider = %provider_code, "Provider has no acknowledge cycle; nothing to do");
            return Ok(InterpretOutcome::NoEffect);
        }

        let advance = ClearanceAdvance::to(ClearanceStatus::Delivered)
            .completed(OUTCOME_COMPLETE, Utc::now())
            .with_additional_remark(REMARK_ACKNOWLEDGED);
        self.advance_summary(request.subject_id, provider_code, advance)
            .await?;
        Ok(InterpretOutcome::Acknowledged)
    }

    /// Forward-only summary update; returns whether anything changed
    async fn advance_summary(
        &self,
        subject_id: i64,
        provider_code: &str,
        advance: ClearanceAdvance,
    ) -> Result<bool> {
        let Some(current) = self
            .stores
            .clearances
            .find_clearance(subject_id, provider_code)
            .await?
        else {
            warn!(subject_id, provider = %provider_code, "No clearance summary to advance");
            return Ok(false);
        };

        if !current.status.can_advance_to(advance.status) {
            info!(
                subject_id,
                provider = %provider_code,
                current = %current.status,
                requested = %advance.status,
                "Clearance already past requested status"
            );
            return Ok(false);
        }

        Ok(self
            .stores
            .clearances
            .advance_clearance(subject_id, provider_code, advance)
            .await?
            .is_some())
    }
}

/// Empty bodies are valid successes with no content
fn parse_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| {
        ClearanceError::InvalidProviderResponse(format!("Response body is not JSON: {e}"))
    })
}
