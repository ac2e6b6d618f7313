//! # Storage Interfaces
//!
//! Async traits the engine persists through. Two backends implement all of
//! them: [`PgStore`] over sqlx and [`MemoryStore`] for tests and embedding.
//!
//! Conditional transitions (claim, requeue, rearm) are single atomic updates in
//! both backends, so concurrent sweeps and runners never both win the same row.

pub mod catalog;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::constants::OperationCode;
use crate::error::Result;
use crate::models::{
    Clearance, ClearanceAdvance, ClearanceLink, EndpointDefinition, Invocation, InvocationLog,
    LinkCompletion, NewClearanceLink, NewInvocation, NewInvocationLog, Program, Subject,
};
use crate::state_machine::{ClearanceStatus, InvocationStatus};

pub use catalog::StaticEndpointCatalog;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait InvocationStore: Send + Sync {
    /// Insert a PENDING row; an identity is logged as sequence 1 in the same
    /// write, so no sweep can claim the row before its ids are on record
    async fn create_invocation(&self, new_invocation: NewInvocation) -> Result<Invocation>;

    async fn find_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>>;

    /// PENDING or RETRY to IN_PROGRESS with `attempt_count + 1`. `None` when the
    /// row is missing or someone else already owns it.
    async fn claim_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>>;

    /// IN_PROGRESS to the attempt outcome
    async fn finish_attempt(
        &self,
        invocation_id: i64,
        status: InvocationStatus,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<Invocation>;

    /// RETRY to PENDING, clearing the retry time; false if the row moved on
    async fn requeue_invocation(&self, invocation_id: i64) -> Result<bool>;

    /// PENDING, RETRY or SUCCESS back to PENDING for another poll cycle
    async fn rearm_invocation(&self, invocation_id: i64) -> Result<bool>;

    /// RETRY rows due at `now`, oldest due first
    async fn due_for_retry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Invocation>>;

    /// PENDING rows, oldest first
    async fn pending_invocations(&self) -> Result<Vec<Invocation>>;

    /// All invocations of one provider operation, newest first
    async fn invocations_for_operation(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Vec<Invocation>>;
}

#[async_trait]
pub trait InvocationLogStore: Send + Sync {
    async fn append_log(&self, entry: NewInvocationLog) -> Result<InvocationLog>;

    /// max(sequence) + 1, or 1 for an invocation without logs
    async fn next_sequence(&self, invocation_id: i64) -> Result<i32>;

    /// Body of the lowest-sequence row that has one
    async fn first_request_body(&self, invocation_id: i64) -> Result<Option<String>>;

    async fn logs_for_invocation(&self, invocation_id: i64) -> Result<Vec<InvocationLog>>;
}

#[async_trait]
pub trait ClearanceStore: Send + Sync {
    async fn find_clearance(&self, subject_id: i64, provider_code: &str)
        -> Result<Option<Clearance>>;

    /// Create the summary row at REQUESTED, or refresh its request date and
    /// remarks. Never moves an existing row backwards.
    async fn record_requested(
        &self,
        subject_id: i64,
        provider_code: &str,
        remark: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Clearance>;

    /// Forward-only update; `None` when no summary row exists
    async fn advance_clearance(
        &self,
        subject_id: i64,
        provider_code: &str,
        advance: ClearanceAdvance,
    ) -> Result<Option<Clearance>>;

    /// Rows at `status`, most recently updated first
    async fn clearances_with_status(&self, status: ClearanceStatus) -> Result<Vec<Clearance>>;
}

#[async_trait]
pub trait ClearanceLinkStore: Send + Sync {
    /// Fails with a conflict when the subject already has an open link with the provider
    async fn insert_link(&self, new_link: NewClearanceLink) -> Result<ClearanceLink>;

    async fn find_open_link(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<Option<ClearanceLink>>;

    async fn open_links_for_subject(
        &self,
        subject_id: i64,
        provider_code: &str,
    ) -> Result<Vec<ClearanceLink>>;

    /// Most recent open link carrying `request_id`
    async fn find_open_by_request_id(
        &self,
        provider_code: &str,
        request_id: &str,
    ) -> Result<Option<ClearanceLink>>;

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ClearanceLink>>;

    async fn find_by_response_id(&self, response_id: &str) -> Result<Option<ClearanceLink>>;

    async fn latest_link_for_subject(
        &self,
        subject_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>>;

    async fn latest_link_for_program(
        &self,
        program_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>>;

    /// Sets response id (when given), completion flag and date. The request id is untouched.
    async fn complete_link(&self, link_id: i64, completion: LinkCompletion) -> Result<ClearanceLink>;
}

#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_subject(&self, subject_id: i64) -> Result<Option<Subject>>;

    async fn find_program(&self, program_id: i64) -> Result<Option<Program>>;

    async fn latest_program_for_subject(&self, subject_id: i64) -> Result<Option<Program>>;
}

#[async_trait]
pub trait EndpointCatalog: Send + Sync {
    async fn active_endpoint(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Option<EndpointDefinition>>;
}

/// The set of stores one engine works against
#[derive(Clone)]
pub struct Stores {
    pub invocations: Arc<dyn InvocationStore>,
    pub logs: Arc<dyn InvocationLogStore>,
    pub clearances: Arc<dyn ClearanceStore>,
    pub links: Arc<dyn ClearanceLinkStore>,
    pub directory: Arc<dyn SubjectDirectory>,
}

impl Stores {
    /// Use one backend for every store
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: InvocationStore
            + InvocationLogStore
            + ClearanceStore
            + ClearanceLinkStore
            + SubjectDirectory
            + 'static,
    {
        Self {
            invocations: backend.clone(),
            logs: backend.clone(),
            clearances: backend.clone(),
            links: backend.clone(),
            directory: backend,
        }
    }
}
