//! In-memory backend with the same conditional-update semantics as [`super::PgStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{ClearanceLinkStore, ClearanceStore, InvocationLogStore, InvocationStore, SubjectDirectory};
use crate::constants::OperationCode;
use crate::error::{ClearanceError, Result};
use crate::models::{
    append_remark, Clearance, ClearanceAdvance, ClearanceLink, Invocation, InvocationLog,
    LinkCompletion, NewClearanceLink, NewInvocation, NewInvocationLog, Program, Subject,
};
use crate::state_machine::{
    ClearanceStatus, InvocationEvent, InvocationStatus, InvocationTransitionGuard,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    invocations: DashMap<i64, Invocation>,
    logs: RwLock<Vec<InvocationLog>>,
    clearances: RwLock<Vec<Clearance>>,
    links: RwLock<Vec<ClearanceLink>>,
    subjects: DashMap<i64, Subject>,
    programs: DashMap<i64, Program>,
    invocation_seq: AtomicI64,
    log_seq: AtomicI64,
    clearance_seq: AtomicI64,
    link_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subject(&self, subject: Subject) {
        self.subjects.insert(subject.subject_id, subject);
    }

    pub fn insert_program(&self, program: Program) {
        self.programs.insert(program.program_id, program);
    }

    /// Overwrite an invocation row as-is
    pub fn put_invocation(&self, invocation: Invocation) {
        self.invocation_seq
            .fetch_max(invocation.invocation_id, Ordering::SeqCst);
        self.invocations.insert(invocation.invocation_id, invocation);
    }

    fn push_log(&self, entry: NewInvocationLog) -> InvocationLog {
        let mut logs = self.logs.write();
        self.push_locked(&mut logs, entry)
    }

    fn push_locked(&self, logs: &mut Vec<InvocationLog>, entry: NewInvocationLog) -> InvocationLog {
        let log = InvocationLog {
            log_id: self.log_seq.fetch_add(1, Ordering::SeqCst) + 1,
            invocation_id: entry.invocation_id,
            sequence: entry.sequence,
            request_payload: entry.request_payload,
            response_payload: entry.response_payload,
            response_status_code: entry.response_status_code,
            status: entry.status,
            request_sent_on: entry.request_sent_on,
            response_received_on: entry.response_received_on,
            response_time_ms: entry.response_time_ms,
            error_details: entry.error_details,
            created_on: Utc::now(),
        };
        logs.push(log.clone());
        log
    }

    /// Overwrite or add a link row as-is
    pub fn put_link(&self, link: ClearanceLink) {
        self.link_seq.fetch_max(link.link_id, Ordering::SeqCst);
        let mut links = self.links.write();
        links.retain(|existing| existing.link_id != link.link_id);
        links.push(link);
    }

    /// Overwrite or add a clearance row as-is
    pub fn put_clearance(&self, clearance: Clearance) {
        self.clearance_seq
            .fetch_max(clearance.clearance_id, Ordering::SeqCst);
        let mut clearances = self.clearances.write();
        clearances.retain(|existing| existing.clearance_id != clearance.clearance_id);
        clearances.push(clearance);
    }

    pub fn links(&self) -> Vec<ClearanceLink> {
        self.links.read().clone()
    }

    pub fn clearances(&self) -> Vec<Clearance> {
        self.clearances.read().clone()
    }

    fn transition(&self, invocation_id: i64, event: InvocationEvent) -> Result<Option<Invocation>> {
        let Some(mut entry) = self.invocations.get_mut(&invocation_id) else {
            return Ok(None);
        };
        let Ok(target) = InvocationTransitionGuard::target(entry.status, &event) else {
            return Ok(None);
        };

        if matches!(event, InvocationEvent::Claim) {
            entry.attempt_count += 1;
        }
        entry.status = target;
        entry.next_retry_time = event.next_retry_time();
        entry.updated_on = Utc::now();
        Ok(Some(entry.clone()))
    }

    fn latest_link_where<F>(&self, predicate: F) -> Option<ClearanceLink>
    where
        F: Fn(&ClearanceLink) -> bool,
    {
        self.links
            .read()
            .iter()
            .filter(|link| predicate(link))
            .max_by_key(|link| (link.requested_date, link.link_id))
            .cloned()
    }
}

fn same_provider(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl InvocationStore for MemoryStore {
    async fn create_invocation(&self, new_invocation: NewInvocation) -> Result<Invocation> {
        let now = Utc::now();
        let invocation = Invocation {
            invocation_id: self.invocation_seq.fetch_add(1, Ordering::SeqCst) + 1,
            provider_code: new_invocation.provider_code,
            operation_code: new_invocation.operation_code,
            status: InvocationStatus::Pending,
            attempt_count: 0,
            next_retry_time: None,
            is_active: true,
            created_on: now,
            updated_on: now,
        };
        if let Some(identity) = new_invocation.identity {
            self.push_log(NewInvocationLog::identity(invocation.invocation_id, 1, identity));
        }
        self.invocations
            .insert(invocation.invocation_id, invocation.clone());
        Ok(invocation)
    }

    async fn find_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>> {
        Ok(self.invocations.get(&invocation_id).map(|entry| entry.clone()))
    }

    async fn claim_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>> {
        self.transition(invocation_id, InvocationEvent::Claim)
    }

    async fn finish_attempt(
        &self,
        invocation_id: i64,
        status: InvocationStatus,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<Invocation> {
        let event = match (status, next_retry_time) {
            (InvocationStatus::Success, _) => InvocationEvent::Succeed,
            (InvocationStatus::Retry, Some(at)) => InvocationEvent::ScheduleRetry(at),
            (InvocationStatus::PermanentlyFailed, _) => {
                InvocationEvent::GiveUp("attempt budget exhausted".to_string())
            }
            _ => {
                return Err(ClearanceError::StateTransitionError(format!(
                    "{status} is not an attempt outcome"
                )))
            }
        };

        let mut entry = self.invocations.get_mut(&invocation_id).ok_or_else(|| {
            ClearanceError::DatabaseError(format!("Invocation {invocation_id} not found"))
        })?;
        let target = InvocationTransitionGuard::target(entry.status, &event)?;
        entry.status = target;
        entry.next_retry_time = event.next_retry_time();
        entry.updated_on = Utc::now();
        Ok(entry.clone())
    }

    async fn requeue_invocation(&self, invocation_id: i64) -> Result<bool> {
        Ok(self
            .transition(invocation_id, InvocationEvent::Requeue)?
            .is_some())
    }

    async fn rearm_invocation(&self, invocation_id: i64) -> Result<bool> {
        Ok(self
            .transition(invocation_id, InvocationEvent::Rearm)?
            .is_some())
    }

    async fn due_for_retry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Invocation>> {
        let mut due: Vec<Invocation> = self
            .invocations
            .iter()
            .filter(|entry| {
                entry.status == InvocationStatus::Retry
                    && entry.next_retry_time.is_some_and(|at| at <= now)
            })
            .map(|entry| entry.clone())
            .collect();
        due.sort_by_key(|invocation| (invocation.next_retry_time, invocation.invocation_id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn pending_invocations(&self) -> Result<Vec<Invocation>> {
        let mut pending: Vec<Invocation> = self
            .invocations
            .iter()
            .filter(|entry| entry.status == InvocationStatus::Pending && entry.is_active)
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by_key(|invocation| (invocation.created_on, invocation.invocation_id));
        Ok(pending)
    }

    async fn invocations_for_operation(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Vec<Invocation>> {
        let mut matching: Vec<Invocation> = self
            .invocations
            .iter()
            .filter(|entry| {
                entry.operation_code == operation_code
                    && same_provider(&entry.provider_code, provider_code)
            })
            .map(|entry| entry.clone())
            .collect();
        matching.sort_by(|a, b| {
            (b.created_on, b.invocation_id).cmp(&(a.created_on, a.invocation_id))
        });
        Ok(matching)
    }
}

#[async_trait]
impl InvocationLogStore for MemoryStore {
    async fn append_log(&self, entry: NewInvocationLog) -> Result<InvocationLog> {
        let mut logs = self.logs.write();
        if logs
            .iter()
            .any(|log| log.invocation_id == entry.invocation_id && log.sequence == entry.sequence)
        {
            return Err(ClearanceError::Conflict(format!(
                "Log sequence {} already written for invocation {}",
                entry.sequence, entry.invocation_id
            )));
        }
        Ok(self.push_locked(&mut logs, entry))
    }

    async fn next_sequence(&self, invocation_id: i64) -> Result<i32> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|log| log.invocation_id == invocation_id)
            .map(|log| log.sequence)
            .max()
            .map_or(1, |max| max + 1))
    }

    async fn first_request_body(&self, invocation_id: i64) -> Result<Option<String>> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|log| log.invocation_id == invocation_id && log.has_request_body())
            .min_by_key(|log| log.sequence)
            .and_then(|log| log.request_payload.clone()))
    }

    async fn logs_for_invocation(&self, invocation_id: i64) -> Result<Vec<InvocationLog>> {
        let mut logs: Vec<InvocationLog> = self
            .logs
            .read()
            .iter()
            .filter(|log| log.invocation_id == invocation_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.sequence);
        Ok(logs)
    }
}

#[async_trait]
impl ClearanceStore for MemoryStore {
    async fn find_clearance(
        &self,
        subject_id: i64,
        provider_code: &str,
    ) -> Result<Option<Clearance>> {
        Ok(self
            .clearances
            .read()
            .iter()
            .find(|c| c.subject_id == subject_id && same_provider(&c.provider_code, provider_code))
            .cloned())
    }

    async fn record_requested(
        &self,
        subject_id: i64,
        provider_code: &str,
        remark: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Clearance> {
        let mut clearances = self.clearances.write();
        if let Some(existing) = clearances
            .iter_mut()
            .find(|c| c.subject_id == subject_id && same_provider(&c.provider_code, provider_code))
        {
            existing.requested_date = requested_at;
            existing.remarks = Some(append_remark(existing.remarks.as_deref(), remark));
            existing.updated_on = Utc::now();
            return Ok(existing.clone());
        }

        let clearance = Clearance {
            clearance_id: self.clearance_seq.fetch_add(1, Ordering::SeqCst) + 1,
            subject_id,
            provider_code: provider_code.to_string(),
            status: ClearanceStatus::Requested,
            requested_date: requested_at,
            completion_date: None,
            outcome: None,
            remarks: Some(remark.to_string()),
            additional_remarks: None,
            updated_on: Utc::now(),
        };
        clearances.push(clearance.clone());
        Ok(clearance)
    }

    async fn advance_clearance(
        &self,
        subject_id: i64,
        provider_code: &str,
        advance: ClearanceAdvance,
    ) -> Result<Option<Clearance>> {
        let mut clearances = self.clearances.write();
        let Some(existing) = clearances
            .iter_mut()
            .find(|c| c.subject_id == subject_id && same_provider(&c.provider_code, provider_code))
        else {
            return Ok(None);
        };

        if !existing.status.can_advance_to(advance.status) {
            return Err(ClearanceError::StateTransitionError(format!(
                "Clearance for subject {subject_id} cannot move from {} to {}",
                existing.status, advance.status
            )));
        }

        existing.status = advance.status;
        if advance.outcome.is_some() {
            existing.outcome = advance.outcome;
        }
        if advance.completion_date.is_some() {
            existing.completion_date = advance.completion_date;
        }
        if let Some(remark) = advance.remark.as_deref() {
            existing.remarks = Some(append_remark(existing.remarks.as_deref(), remark));
        }
        if let Some(remark) = advance.additional_remark.as_deref() {
            existing.additional_remarks =
                Some(append_remark(existing.additional_remarks.as_deref(), remark));
        }
        existing.updated_on = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn clearances_with_status(&self, status: ClearanceStatus) -> Result<Vec<Clearance>> {
        let mut matching: Vec<Clearance> = self
            .clearances
            .read()
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.updated_on, b.clearance_id).cmp(&(a.updated_on, a.clearance_id)));
        Ok(matching)
    }
}

#[async_trait]
impl ClearanceLinkStore for MemoryStore {
    async fn insert_link(&self, new_link: NewClearanceLink) -> Result<ClearanceLink> {
        let mut links = self.links.write();
        if links.iter().any(|link| {
            !link.is_completed
                && link.subject_id == new_link.subject_id
                && same_provider(&link.provider_code, &new_link.provider_code)
        }) {
            return Err(ClearanceError::Conflict(format!(
                "Subject {} already has an open link with {}",
                new_link.subject_id, new_link.provider_code
            )));
        }

        let now = Utc::now();
        let link = ClearanceLink {
            link_id: self.link_seq.fetch_add(1, Ordering::SeqCst) + 1,
            subject_id: new_link.subject_id,
            program_id: new_link.program_id,
            provider_code: new_link.provider_code,
            provider_request_id: Some(new_link.provider_request_id),
            provider_response_id: None,
            is_completed: false,
            retry_count: 0,
            requested_date: now,
            completion_date: None,
            updated_on: now,
        };
        links.push(link.clone());
        Ok(link)
    }

    async fn find_open_link(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| {
            !link.is_completed
                && link.subject_id == subject_id
                && link.program_id == program_id
                && same_provider(&link.provider_code, provider_code)
        }))
    }

    async fn open_links_for_subject(
        &self,
        subject_id: i64,
        provider_code: &str,
    ) -> Result<Vec<ClearanceLink>> {
        Ok(self
            .links
            .read()
            .iter()
            .filter(|link| {
                !link.is_completed
                    && link.subject_id == subject_id
                    && same_provider(&link.provider_code, provider_code)
            })
            .cloned()
            .collect())
    }

    async fn find_open_by_request_id(
        &self,
        provider_code: &str,
        request_id: &str,
    ) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| {
            !link.is_completed
                && same_provider(&link.provider_code, provider_code)
                && link.request_id() == Some(request_id)
        }))
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| link.request_id() == Some(request_id)))
    }

    async fn find_by_response_id(&self, response_id: &str) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| link.response_id() == Some(response_id)))
    }

    async fn latest_link_for_subject(
        &self,
        subject_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| {
            link.subject_id == subject_id
                && provider_code.map_or(true, |code| same_provider(&link.provider_code, code))
        }))
    }

    async fn latest_link_for_program(
        &self,
        program_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>> {
        Ok(self.latest_link_where(|link| {
            link.program_id == program_id
                && provider_code.map_or(true, |code| same_provider(&link.provider_code, code))
        }))
    }

    async fn complete_link(&self, link_id: i64, completion: LinkCompletion) -> Result<ClearanceLink> {
        let mut links = self.links.write();
        let link = links
            .iter_mut()
            .find(|link| link.link_id == link_id)
            .ok_or_else(|| ClearanceError::DatabaseError(format!("Link {link_id} not found")))?;

        if let Some(response_id) = completion
            .provider_response_id
            .filter(|id| !id.trim().is_empty())
        {
            link.provider_response_id = Some(response_id);
        }
        link.is_completed = true;
        link.completion_date = Some(completion.completion_date);
        link.updated_on = Utc::now();
        Ok(link.clone())
    }
}

#[async_trait]
impl SubjectDirectory for MemoryStore {
    async fn find_subject(&self, subject_id: i64) -> Result<Option<Subject>> {
        Ok(self.subjects.get(&subject_id).map(|entry| entry.clone()))
    }

    async fn find_program(&self, program_id: i64) -> Result<Option<Program>> {
        Ok(self.programs.get(&program_id).map(|entry| entry.clone()))
    }

    async fn latest_program_for_subject(&self, subject_id: i64) -> Result<Option<Program>> {
        Ok(self
            .programs
            .iter()
            .filter(|entry| entry.subject_id == subject_id)
            .max_by_key(|entry| (entry.requested_on, entry.program_id))
            .map(|entry| entry.clone()))
    }
}
