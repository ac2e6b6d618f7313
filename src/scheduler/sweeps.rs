//! The four sweeps. Each row is only moved under its current state, so sweeps
//! can overlap with themselves, with each other and with caller-driven runs.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::queue::ExecutionQueue;
use super::SweepReport;
use crate::constants::OperationCode;
use crate::error::Result;
use crate::models::{Clearance, ClearanceLink, Invocation, NewInvocation};
use crate::providers::ProviderRegistry;
use crate::resolver::{Bootstrap, ContextResolver};
use crate::state_machine::{ClearanceStatus, InvocationStatus};
use crate::store::{EndpointCatalog, Stores};

/// A clearance that is due for another poll of one operation
#[derive(Debug, Clone)]
struct PollTarget {
    provider_code: String,
    subject_id: i64,
    program_id: i64,
}

impl PollTarget {
    fn key(&self) -> (i64, i64) {
        (self.subject_id, self.program_id)
    }
}

/// Invocations of one operation by the (subject, program) their first logged
/// body decodes to. Each provider's rows are decoded once per sweep.
struct CandidateIndex {
    operation: OperationCode,
    by_provider: HashMap<String, HashMap<(i64, i64), i64>>,
}

impl CandidateIndex {
    fn new(operation: OperationCode) -> Self {
        Self {
            operation,
            by_provider: HashMap::new(),
        }
    }

    fn is_loaded(&self, provider_code: &str) -> bool {
        self.by_provider.contains_key(provider_code)
    }

    fn lookup(&self, target: &PollTarget) -> Option<i64> {
        self.by_provider
            .get(&target.provider_code)
            .and_then(|decoded| decoded.get(&target.key()))
            .copied()
    }

    fn insert(&mut self, target: &PollTarget, invocation_id: i64) {
        self.by_provider
            .entry(target.provider_code.clone())
            .or_default()
            .insert(target.key(), invocation_id);
    }
}

pub struct ClearanceSweeps {
    stores: Stores,
    catalog: Arc<dyn EndpointCatalog>,
    providers: Arc<ProviderRegistry>,
    resolver: Arc<ContextResolver>,
    queue: ExecutionQueue,
    retry_batch_size: i64,
}

impl ClearanceSweeps {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn EndpointCatalog>,
        providers: Arc<ProviderRegistry>,
        resolver: Arc<ContextResolver>,
        queue: ExecutionQueue,
        retry_batch_size: i64,
    ) -> Self {
        Self {
            stores,
            catalog,
            providers,
            resolver,
            queue,
            retry_batch_size,
        }
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    /// Run every PENDING invocation; ids are reconstructed from their logs
    #[instrument(skip(self))]
    pub async fn run_pending(&self) -> Result<SweepReport> {
        let pending = self.stores.invocations.pending_invocations().await?;
        let mut report = SweepReport::new("pending", pending.len());
        for invocation in pending {
            match self.queue.submit(invocation.invocation_id, None).await {
                Ok(true) => report.advanced += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(invocation_id = invocation.invocation_id, error = %e, "Pending run failed");
                    report.skipped += 1;
                }
            }
        }
        Ok(report.logged())
    }

    /// RETRY rows whose time has come go back to PENDING and run again
    #[instrument(skip(self))]
    pub async fn run_retries(&self) -> Result<SweepReport> {
        let due = self
            .stores
            .invocations
            .due_for_retry(Utc::now(), self.retry_batch_size)
            .await?;
        let mut report = SweepReport::new("retry", due.len());

        for invocation in due {
            let invocation_id = invocation.invocation_id;
            // a racing process may have finished the row since the select
            if !self.stores.invocations.requeue_invocation(invocation_id).await? {
                debug!(invocation_id, "Invocation moved on before requeue");
                report.skipped += 1;
                continue;
            }
            match self.queue.submit(invocation_id, None).await {
                Ok(true) => report.advanced += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(invocation_id, error = %e, "Retry run failed");
                    report.skipped += 1;
                }
            }
        }
        Ok(report.logged())
    }

    /// Poll status for clearances that have a provider request id but have not
    /// reached their provider's completion code
    #[instrument(skip(self))]
    pub async fn poll_status(&self) -> Result<SweepReport> {
        let requested = self
            .stores
            .clearances
            .clearances_with_status(ClearanceStatus::Requested)
            .await?;
        let mut report = SweepReport::new("status_poll", requested.len());
        let mut index = CandidateIndex::new(OperationCode::GetClearanceStatus);

        for clearance in requested {
            if !self.providers.contains(&clearance.provider_code) {
                debug!(provider = %clearance.provider_code, "Provider not registered");
                report.skipped += 1;
                continue;
            }

            let target = match self.status_target(&clearance).await {
                Ok(Some(target)) => target,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(subject_id = clearance.subject_id, error = %e, "Failed to load clearance link");
                    report.skipped += 1;
                    continue;
                }
            };
            self.poll(&mut index, target, &mut report).await;
        }
        Ok(report.logged())
    }

    /// Acknowledge cleared results for providers with a third cycle
    #[instrument(skip(self))]
    pub async fn poll_acknowledge(&self) -> Result<SweepReport> {
        let cleared = self
            .stores
            .clearances
            .clearances_with_status(ClearanceStatus::Cleared)
            .await?;
        let mut report = SweepReport::new("acknowledge", cleared.len());
        let mut index = CandidateIndex::new(OperationCode::AcknowledgeResponse);

        for clearance in &cleared {
            let acknowledges = self
                .providers
                .get(&clearance.provider_code)
                .is_some_and(|protocol| protocol.has_acknowledge_cycle());
            if !acknowledges {
                report.skipped += 1;
                continue;
            }

            let target = match self.acknowledge_target(&clearance).await {
                Ok(Some(target)) => target,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(subject_id = clearance.subject_id, error = %e, "Failed to load clearance link");
                    report.skipped += 1;
                    continue;
                }
            };
        let mut report = SweepReport::new("acknowledge", cleared.len());
        let mut index = CandidateIndex::new(OperationCode::AcknowledgeResponse);

        }
        Ok(report.logged())
    }

    async fn status_target(&self, clearance: &Clearance) -> Result<Option<PollTarget>> {
        let open = self
            .stores
            .links
            .open_links_for_subject(clearance.subject_id, &clearance.provider_code)
            .await?;
        let link = open.into_iter().find(|link| link.request_id().is_some());
        if link.is_none() {
            debug!(subject_id = clearance.subject_id, "No provider request id recorded yet");
        }
        Ok(link.map(|link| target_for(&link)))
    }

    async fn acknowledge_target(&self, clearance: &Clearance) -> Result<Option<PollTarget>> {
        let link = self
            .stores
            .links
            .latest_link_for_subject(clearance.subject_id, Some(&clearance.provider_code))
            .await?
            .filter(|link| link.response_id().is_some());
        Ok(link.map(|link| target_for(&link)))
    }

    /// Re-arm the matching invocation while its budget lasts, or start a new one
    async fn poll(&self, index: &mut CandidateIndex, target: PollTarget, report: &mut SweepReport) {
        match self.poll_target(index, &target).await {
            Ok(true) => report.advanced += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!(
                    provider = %target.provider_code,
                    subject_id = target.subject_id,
                    program_id = target.program_id,
                    operation = %index.operation,
                    error = %e,
                    "Poll failed"
                );
                report.skipped += 1;
            }
        }
    }

    async fn poll_target(&self, index: &mut CandidateIndex, target: &PollTarget) -> Result<bool> {
        let operation = index.operation;
        let bootstrap = Bootstrap::new(target.subject_id, target.program_id);

        let Some(existing) = self.find_matching_invocation(index, target).await? else {
            let created = self
                .stores
                .invocations
                .create_invocation(
                    NewInvocation::new(target.provider_code.clone(), operation)
                        .with_identity(bootstrap.identity_body()),
                )
                .await?;
            index.insert(target, created.invocation_id);
            info!(
                invocation_id = created.invocation_id,
                operation = %operation,
                subject_id = target.subject_id,
                program_id = target.program_id,
                "Created poll invocation"
            );
            return self.queue.submit(created.invocation_id, Some(bootstrap)).await;
        };

        let Some(endpoint) = self
            .catalog
            .active_endpoint(&target.provider_code, operation)
            .await?
        else {
            warn!(provider = %target.provider_code, operation = %operation, "No active endpoint to poll");
            return Ok(false);
        };
        if existing.attempt_count >= endpoint.retrigger_count {
            info!(
                invocation_id = existing.invocation_id,
                attempt_count = existing.attempt_count,
                retrigger_count = endpoint.retrigger_count,
                "Poll budget exhausted"
            );
            return Ok(false);
        }
        if matches!(
            existing.status,
            InvocationStatus::InProgress | InvocationStatus::PermanentlyFailed
        ) {
            debug!(invocation_id = existing.invocation_id, status = %existing.status, "Invocation not re-armable");
            return Ok(false);
        }

        if !self
            .stores
            .invocations
            .rearm_invocation(existing.invocation_id)
            .await?
        {
            return Ok(false);
        }
        self.queue.submit(existing.invocation_id, Some(bootstrap)).await
    }

    /// Newest invocation of the operation whose logged body decodes to the target,
    /// read fresh so earlier polls in the same sweep are seen
    async fn find_matching_invocation(
        &self,
        index: &mut CandidateIndex,
        target: &PollTarget,
    ) -> Result<Option<Invocation>> {
        if !index.is_loaded(&target.provider_code) {
            let decoded = self
                .decode_candidates(&target.provider_code, index.operation)
                .await?;
            index
                .by_provider
                .insert(target.provider_code.clone(), decoded);
        }
        match index.lookup(target) {
            Some(invocation_id) => self.stores.invocations.find_invocation(invocation_id).await,
            None => Ok(None),
        }
    }

    async fn decode_candidates(
        &self,
        provider_code: &str,
        operation: OperationCode,
    ) -> Result<HashMap<(i64, i64), i64>> {
        let candidates = self
            .stores
            .invocations
            .invocations_for_operation(provider_code, operation)
            .await?;

        let mut decoded = HashMap::new();
        for candidate in &candidates {
            match self.resolver.resolve(candidate, None).await {
                Ok(context) => {
                    // newest first, so the first row seen for a pair wins
                    decoded
                        .entry((context.subject_id, context.program_id))
                        .or_insert(candidate.invocation_id);
                }
                Err(e) => {
                    debug!(invocation_id = candidate.invocation_id, error = %e, "Candidate not decodable");
                }
            }
        }
        debug!(
            provider = %provider_code,
            operation = %operation,
            candidates = candidates.len(),
            decoded = decoded.len(),
            "Indexed poll candidates"
        );
        Ok(decoded)
    }
}

fn target_for(link: &ClearanceLink) -> PollTarget {
    PollTarget {
        provider_code: link.provider_code.clone(),
        subject_id: link.subject_id,
        program_id: link.program_id,
    }
}
