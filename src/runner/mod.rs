//! # Invocation Runner
//!
//! Executes one attempt of an invocation end to end.
//!
//! ## Attempt
//!
//! 1. Claim: PENDING or RETRY to IN_PROGRESS with `attempt_count + 1`, persisted
//!    before anything else so a crash shows up as a stuck row, never a silent
//!    double attempt. A row that cannot be claimed is already being handled.
//! 2. With a bootstrap, make sure the invocation's ids are on record as an
//!    identity row. Creation writes it up front; rows created bare get it here,
//!    before anything else can fail, so a retry can always reconstruct them.
//! 3. Load the active endpoint, resolve (subject, program), compose and render
//!    the payload.
//! 4. Log the request row, attach the bearer token, send exactly once, log the
//!    response row. A rejected token is invalidated for the next attempt.
//! 5. Classify: 2xx is SUCCESS and goes to the interpreter. Anything else,
//!    including an error raised along the way, is RETRY while the endpoint's
//!    budget lasts and PERMANENTLY_FAILED after. Unresolvable context fails
//!    permanently at once.
//!
//! Every path ends the attempt in SUCCESS, RETRY or PERMANENTLY_FAILED and
//! leaves at least one log row behind.

pub mod request;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::TokenCache;
use crate::composer::RequestComposer;
use crate::config::RunnerConfig;
use crate::error::{ClearanceError, Result};
use crate::interpreter::{InterpretRequest, ResponseInterpreter};
use crate::logging::log_invocation_transition;
use crate::models::{EndpointDefinition, Invocation, NewInvocationLog, RetryPolicy};
use crate::rendering::PayloadRenderer;
use crate::resolver::{Bootstrap, ContextResolver, ResolvedContext};
use crate::state_machine::InvocationStatus;
use crate::store::{EndpointCatalog, Stores};
use crate::transport::{HttpTransport, OutboundRequest, TransportResponse};

use request::{build_url, carries_rendered_body, error_details, is_token_rejection, placeholder_id, ID_PLACEHOLDER};

/// Collaborators one runner works with
#[derive(Clone)]
pub struct RunnerDeps {
    pub stores: Stores,
    pub catalog: Arc<dyn EndpointCatalog>,
    pub resolver: Arc<ContextResolver>,
    pub composer: Arc<RequestComposer>,
    pub renderer: Arc<dyn PayloadRenderer>,
    pub transport: Arc<dyn HttpTransport>,
    pub tokens: Arc<TokenCache>,
    pub interpreter: Arc<ResponseInterpreter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Missing, terminal, or owned by another runner
    NotClaimed,
    Finished {
        status: InvocationStatus,
        attempt_count: i32,
    },
}

impl RunOutcome {
    pub fn status(&self) -> Option<InvocationStatus> {
        match self {
            Self::NotClaimed => None,
            Self::Finished { status, .. } => Some(*status),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(InvocationStatus::Success)
    }
}

/// What the exchange itself came to, before retry classification
enum Exchange {
    Delivered,
    Rejected,
}

pub struct InvocationRunner {
    deps: RunnerDeps,
    config: RunnerConfig,
}

impl InvocationRunner {
    pub fn new(deps: RunnerDeps, config: RunnerConfig) -> Self {
        Self { deps, config }
    }

    pub fn stores(&self) -> &Stores {
        &self.deps.stores
    }

    #[instrument(skip(self), fields(correlation_id = %Uuid::new_v4()))]
    pub async fn execute(
        &self,
        invocation_id: i64,
        bootstrap: Option<Bootstrap>,
    ) -> Result<RunOutcome> {
        let Some(current) = self.deps.stores.invocations.find_invocation(invocation_id).await? else {
            debug!(invocation_id, "Invocation not found");
            return Ok(RunOutcome::NotClaimed);
        };
        if !current.status.is_claimable() {
            debug!(invocation_id, status = %current.status, "Invocation not claimable");
            return Ok(RunOutcome::NotClaimed);
        }

        let Some(invocation) = self.deps.stores.invocations.claim_invocation(invocation_id).await? else {
            debug!(invocation_id, "Invocation claimed elsewhere");
            return Ok(RunOutcome::NotClaimed);
        };
        log_invocation_transition(
            invocation_id,
            &invocation.provider_code,
            invocation.operation_code.as_str(),
            current.status.as_str(),
            InvocationStatus::InProgress.as_str(),
            invocation.attempt_count,
        );

        let mut endpoint = None;
        let (status, next_retry_time) =
            match self.attempt(&invocation, bootstrap, &mut endpoint).await {
                Ok(Exchange::Delivered) => (InvocationStatus::Success, None),
                Ok(Exchange::Rejected) => {
                    let decision = self
                        .retry_policy(&invocation, endpoint.as_ref())
                        .await
                        .decide(invocation.attempt_count, Utc::now());
                    (decision.status(), decision.next_retry_time())
                }
                Err(e) => self.classify_error(&invocation, endpoint.as_ref(), e).await,
            };

        let finished = self
            .deps
            .stores
            .invocations
            .finish_attempt(invocation_id, status, next_retry_time)
            .await?;
        log_invocation_transition(
            invocation_id,
            &finished.provider_code,
            finished.operation_code.as_str(),
            InvocationStatus::InProgress.as_str(),
            finished.status.as_str(),
            finished.attempt_count,
        );

        Ok(RunOutcome::Finished {
            status: finished.status,
            attempt_count: finished.attempt_count,
        })
    }

    async fn attempt(
        &self,
        invocation: &Invocation,
        bootstrap: Option<Bootstrap>,
        endpoint_slot: &mut Option<EndpointDefinition>,
    ) -> Result<Exchange> {
        if let Some(bootstrap) = bootstrap {
            self.record_identity(invocation.invocation_id, bootstrap).await?;
        }

        let provider_code = invocation.provider_code.as_str();
        let endpoint = self
            .deps
            .catalog
            .active_endpoint(provider_code, invocation.operation_code)
            .await?
            .ok_or_else(|| {
                ClearanceError::endpoint_not_found(provider_code, invocation.operation_code.as_str())
            })?;
        *endpoint_slot = Some(endpoint.clone());

        let context = self.deps.resolver.resolve(invocation, bootstrap).await?;
        debug!(
            subject_id = context.subject_id,
            program_id = context.program_id,
            source = ?context.source,
            "Context resolved"
        );

        let url = self.url_for(&endpoint, invocation, &context).await?;
        let body = if carries_rendered_body(&endpoint.http_method) && endpoint.has_payload_template() {
            let bundle = self
                .deps
                .composer
                .compose_for(&endpoint, context.subject_id, context.program_id)
                .await?;
            Some(self.deps.renderer.render(&endpoint.payload_template, &bundle)?)
        } else {
            None
        };

        let invocation_id = invocation.invocation_id;
        let sequence = self.deps.stores.logs.next_sequence(invocation_id).await?;
        self.deps
            .stores
            .logs
            .append_log(NewInvocationLog::request(invocation_id, sequence, body.clone()))
            .await?;

        let timeout = Duration::from_secs(u64::try_from(endpoint.timeout_seconds.max(1)).unwrap_or(30));
        let mut outbound =
            OutboundRequest::new(&endpoint.http_method, url, timeout).with_body(body.clone());
        if let Some(token) = self.deps.tokens.bearer_token(provider_code).await? {
            outbound = outbound.with_bearer_token(&token);
        }

        info!(method = %outbound.method, url = %outbound.url, "Sending provider request");
        let response = self.deps.transport.send(outbound).await;
        self.log_response(invocation_id, sequence + 1, &response).await?;

        if is_token_rejection(&response) {
            warn!(provider = %provider_code, status_code = response.status_code, "Provider rejected access token");
            self.deps.tokens.invalidate(provider_code);
        }

        if !response.is_success() {
            warn!(
                status_code = response.status_code,
                elapsed_ms = response.elapsed_ms,
                "Provider call failed"
            );
            return Ok(Exchange::Rejected);
        }

        let interpreted = self
            .deps
            .interpreter
            .interpret(InterpretRequest {
                invocation,
                response_body: &response.body,
                request_body: body.as_deref(),
                subject_id: context.subject_id,
                program_id: context.program_id,
            })
            .await;
        match interpreted {
            Ok(outcome) if !outcome.succeeded() => {
                warn!(outcome = ?outcome, "Provider response advanced nothing");
            }
            Ok(outcome) => debug!(outcome = ?outcome, "Provider response applied"),
            Err(e) => {
                // the exchange itself succeeded; keep the invocation SUCCESS
                error!(error = %e, kind = e.kind(), "Failed to interpret provider response");
                self.append_error_row(invocation_id, &e.to_string()).await;
            }
        }

        Ok(Exchange::Delivered)
    }

    /// Log `bootstrap` as an identity row unless the invocation already has a
    /// body to reconstruct from. Returns whether a row was written.
    pub async fn record_identity(&self, invocation_id: i64, bootstrap: Bootstrap) -> Result<bool> {
        if bootstrap.is_empty() {
            return Ok(false);
        }
        let logs = &self.deps.stores.logs;
        if logs.first_request_body(invocation_id).await?.is_some() {
            return Ok(false);
        }
        let sequence = logs.next_sequence(invocation_id).await?;
        logs.append_log(NewInvocationLog::identity(
            invocation_id,
            sequence,
            bootstrap.identity_body(),
        ))
        .await?;
        debug!(invocation_id, sequence, "Identity recorded");
        Ok(true)
    }

    async fn url_for(
        &self,
        endpoint: &EndpointDefinition,
        invocation: &Invocation,
        context: &ResolvedContext,
    ) -> Result<String> {
        if !endpoint.path_template.contains(ID_PLACEHOLDER) {
            return build_url(&endpoint.base_url, &endpoint.path_template, None);
        }

        let provider_code = invocation.provider_code.as_str();
        let links = &self.deps.stores.links;
        let link = match links
            .find_open_link(context.subject_id, context.program_id, provider_code)
            .await?
        {
            Some(link) => Some(link),
            None => links
                .latest_link_for_program(context.program_id, Some(provider_code))
                .await?
                .filter(|link| link.subject_id == context.subject_id),
        };

        let id = placeholder_id(invocation.operation_code, link.as_ref());
        build_url(&endpoint.base_url, &endpoint.path_template, id.as_deref())
    }

    async fn log_response(
        &self,
        invocation_id: i64,
        sequence: i32,
        response: &TransportResponse,
    ) -> Result<()> {
        let (status, details) = if response.is_success() {
            (InvocationStatus::Success, None)
        } else {
            (
                InvocationStatus::Failed,
                Some(error_details(response, self.config.error_detail_max_chars)),
            )
        };
        let body = Some(response.body.clone()).filter(|body| !body.is_empty());

        self.deps
            .stores
            .logs
            .append_log(NewInvocationLog::response(
                invocation_id,
                sequence,
                status,
                response.status_code,
                body,
                response.elapsed_ms,
                details,
            ))
            .await?;
        Ok(())
    }

    async fn classify_error(
        &self,
        invocation: &Invocation,
        endpoint: Option<&EndpointDefinition>,
        e: ClearanceError,
    ) -> (InvocationStatus, Option<chrono::DateTime<Utc>>) {
        error!(
            invocation_id = invocation.invocation_id,
            error = %e,
            kind = e.kind(),
            "Invocation attempt failed"
        );
        self.append_error_row(invocation.invocation_id, &e.to_string())
            .await;

        if e.is_data_problem() {
            return (InvocationStatus::PermanentlyFailed, None);
        }
        let decision = self
            .retry_policy(invocation, endpoint)
            .await
            .decide(invocation.attempt_count, Utc::now());
        (decision.status(), decision.next_retry_time())
    }

    /// The attempt's endpoint, a fresh lookup, or the configured fallback
    async fn retry_policy(
        &self,
        invocation: &Invocation,
        endpoint: Option<&EndpointDefinition>,
    ) -> RetryPolicy {
        if let Some(endpoint) = endpoint {
            return endpoint.retry_policy();
        }
        match self
            .deps
            .catalog
            .active_endpoint(&invocation.provider_code, invocation.operation_code)
            .await
        {
            Ok(Some(endpoint)) => endpoint.retry_policy(),
            Ok(None) => self.config.fallback_retry,
            Err(e) => {
                warn!(error = %e, "Endpoint lookup failed during retry classification");
                self.config.fallback_retry
            }
        }
    }

    async fn append_error_row(&self, invocation_id: i64, details: &str) {
        let logs = &self.deps.stores.logs;
        let written = match logs.next_sequence(invocation_id).await {
            Ok(sequence) => logs
                .append_log(NewInvocationLog::error(
                    invocation_id,
                    sequence,
                    crate::utils::json::truncate_chars(details, self.config.error_detail_max_chars),
                ))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!(invocation_id, error = %e, "Failed to write error log row");
        }
    }
}
