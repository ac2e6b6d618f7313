//! PostgreSQL backend.
//!
//! Runtime-checked `query_as` against the schema in `migrations/`. State guards
//! are expressed as `WHERE status ...` clauses so each transition is a single
//! conditional update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error};

use super::{
    ClearanceLinkStore, ClearanceStore, EndpointCatalog, InvocationLogStore, InvocationStore,
    SubjectDirectory,
};
use crate::constants::{OperationCode, REMARK_SEPARATOR};
use crate::error::{ClearanceError, Result};
use crate::models::{
    append_remark, Clearance, ClearanceAdvance, ClearanceLink, EndpointDefinition, Invocation,
    InvocationLog, LinkCompletion, NewClearanceLink, NewInvocation, NewInvocationLog, Program,
    Subject,
};
use crate::state_machine::{ClearanceStatus, InvocationStatus};

const INVOCATION_COLUMNS: &str = "invocation_id, provider_code, operation_code, status, \
    attempt_count, next_retry_time, is_active, created_on, updated_on";

const LOG_COLUMNS: &str = "log_id, invocation_id, sequence, request_payload, response_payload, \
    response_status_code, status, request_sent_on, response_received_on, response_time_ms, \
    error_details, created_on";

const CLEARANCE_COLUMNS: &str = "clearance_id, subject_id, provider_code, status, requested_date, \
    completion_date, outcome, remarks, additional_remarks, updated_on";

const LINK_COLUMNS: &str = "link_id, subject_id, program_id, provider_code, provider_request_id, \
    provider_response_id, is_completed, retry_count, requested_date, completion_date, updated_on";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(operation: &str) -> impl Fn(sqlx::Error) -> ClearanceError + '_ {
    move |e| {
        error!(operation = %operation, error = %e, "Database operation failed");
        ClearanceError::from(e)
    }
}

#[async_trait]
impl InvocationStore for PgStore {
    async fn create_invocation(&self, new_invocation: NewInvocation) -> Result<Invocation> {
        let query = format!(
            "INSERT INTO clearance_invocations (provider_code, operation_code, status, attempt_count, is_active)
             VALUES ($1, $2, 'PENDING', 0, TRUE)
             RETURNING {INVOCATION_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(db_error("create_invocation"))?;
        let invocation = sqlx::query_as::<_, Invocation>(&query)
            .bind(&new_invocation.provider_code)
            .bind(new_invocation.operation_code.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("create_invocation"))?;

        if let Some(identity) = new_invocation.identity {
            let entry = NewInvocationLog::identity(invocation.invocation_id, 1, identity);
            sqlx::query(
                "INSERT INTO clearance_invocation_logs (invocation_id, sequence, request_payload, status)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(entry.invocation_id)
            .bind(entry.sequence)
            .bind(&entry.request_payload)
            .bind(entry.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("create_invocation"))?;
        }

        tx.commit().await.map_err(db_error("create_invocation"))?;
        Ok(invocation)
    }

    async fn find_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>> {
        let query = format!(
            "SELECT {INVOCATION_COLUMNS} FROM clearance_invocations WHERE invocation_id = $1"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .bind(invocation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_invocation"))
    }

    async fn claim_invocation(&self, invocation_id: i64) -> Result<Option<Invocation>> {
        let query = format!(
            "UPDATE clearance_invocations
             SET status = 'IN_PROGRESS', attempt_count = attempt_count + 1, updated_on = NOW()
             WHERE invocation_id = $1 AND status IN ('PENDING', 'RETRY')
             RETURNING {INVOCATION_COLUMNS}"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .bind(invocation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("claim_invocation"))
    }

    async fn finish_attempt(
        &self,
        invocation_id: i64,
        status: InvocationStatus,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<Invocation> {
        if !status.is_attempt_outcome() {
            return Err(ClearanceError::StateTransitionError(format!(
                "{status} is not an attempt outcome"
            )));
        }
        let query = format!(
            "UPDATE clearance_invocations
             SET status = $2, next_retry_time = $3, updated_on = NOW()
             WHERE invocation_id = $1 AND status = 'IN_PROGRESS'
             RETURNING {INVOCATION_COLUMNS}"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .bind(invocation_id)
            .bind(status.as_str())
            .bind(next_retry_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("finish_attempt"))?
            .ok_or_else(|| {
                ClearanceError::StateTransitionError(format!(
                    "Invocation {invocation_id} is not in progress"
                ))
            })
    }

    async fn requeue_invocation(&self, invocation_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE clearance_invocations
             SET status = 'PENDING', next_retry_time = NULL, updated_on = NOW()
             WHERE invocation_id = $1 AND status = 'RETRY'",
        )
        .bind(invocation_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("requeue_invocation"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn rearm_invocation(&self, invocation_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE clearance_invocations
             SET status = 'PENDING', next_retry_time = NULL, updated_on = NOW()
             WHERE invocation_id = $1 AND status IN ('PENDING', 'RETRY', 'SUCCESS')",
        )
        .bind(invocation_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("rearm_invocation"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_for_retry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Invocation>> {
        let query = format!(
            "SELECT {INVOCATION_COLUMNS} FROM clearance_invocations
             WHERE status = 'RETRY' AND next_retry_time IS NOT NULL AND next_retry_time <= $1
             ORDER BY next_retry_time ASC, invocation_id ASC
             LIMIT $2"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("due_for_retry"))
    }

    async fn pending_invocations(&self) -> Result<Vec<Invocation>> {
        let query = format!(
            "SELECT {INVOCATION_COLUMNS} FROM clearance_invocations
             WHERE status = 'PENDING' AND is_active
             ORDER BY created_on ASC, invocation_id ASC"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("pending_invocations"))
    }

    async fn invocations_for_operation(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Vec<Invocation>> {
        let query = format!(
            "SELECT {INVOCATION_COLUMNS} FROM clearance_invocations
             WHERE UPPER(provider_code) = UPPER($1) AND operation_code = $2
             ORDER BY created_on DESC, invocation_id DESC"
        );
        sqlx::query_as::<_, Invocation>(&query)
            .bind(provider_code)
            .bind(operation_code.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("invocations_for_operation"))
    }
}

#[async_trait]
impl InvocationLogStore for PgStore {
    async fn append_log(&self, entry: NewInvocationLog) -> Result<InvocationLog> {
        let query = format!(
            "INSERT INTO clearance_invocation_logs (invocation_id, sequence, request_payload,
                response_payload, response_status_code, status, request_sent_on,
                response_received_on, response_time_ms, error_details)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {LOG_COLUMNS}"
        );
        sqlx::query_as::<_, InvocationLog>(&query)
            .bind(entry.invocation_id)
            .bind(entry.sequence)
            .bind(&entry.request_payload)
            .bind(&entry.response_payload)
            .bind(entry.response_status_code)
            .bind(entry.status.as_str())
            .bind(entry.request_sent_on)
            .bind(entry.response_received_on)
            .bind(entry.response_time_ms)
            .bind(&entry.error_details)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("append_log"))
    }

    async fn next_sequence(&self, invocation_id: i64) -> Result<i32> {
        sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM clearance_invocation_logs WHERE invocation_id = $1",
        )
        .bind(invocation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("next_sequence"))
    }

    async fn first_request_body(&self, invocation_id: i64) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT request_payload FROM clearance_invocation_logs
             WHERE invocation_id = $1 AND request_payload IS NOT NULL AND btrim(request_payload) <> ''
             ORDER BY sequence ASC
             LIMIT 1",
        )
        .bind(invocation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("first_request_body"))
    }

    async fn logs_for_invocation(&self, invocation_id: i64) -> Result<Vec<InvocationLog>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM clearance_invocation_logs
             WHERE invocation_id = $1 ORDER BY sequence ASC"
        );
        sqlx::query_as::<_, InvocationLog>(&query)
            .bind(invocation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("logs_for_invocation"))
    }
}

#[async_trait]
impl ClearanceStore for PgStore {
    async fn find_clearance(
        &self,
        subject_id: i64,
        provider_code: &str,
    ) -> Result<Option<Clearance>> {
        let query = format!(
            "SELECT {CLEARANCE_COLUMNS} FROM clearances
             WHERE subject_id = $1 AND UPPER(provider_code) = UPPER($2)"
        );
        sqlx::query_as::<_, Clearance>(&query)
            .bind(subject_id)
            .bind(provider_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_clearance"))
    }

    async fn record_requested(
        &self,
        subject_id: i64,
        provider_code: &str,
        remark: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Clearance> {
        let query = format!(
            "INSERT INTO clearances (subject_id, provider_code, status, requested_date, remarks)
             VALUES ($1, $2, 'REQUESTED', $3, $4)
             ON CONFLICT (subject_id, provider_code) DO UPDATE SET
                requested_date = EXCLUDED.requested_date,
                remarks = CASE
                    WHEN clearances.remarks IS NULL OR btrim(clearances.remarks) = '' THEN EXCLUDED.remarks
                    ELSE clearances.remarks || '{REMARK_SEPARATOR}' || EXCLUDED.remarks
                END,
                updated_on = NOW()
             RETURNING {CLEARANCE_COLUMNS}"
        );
        sqlx::query_as::<_, Clearance>(&query)
            .bind(subject_id)
            .bind(provider_code)
            .bind(requested_at)
            .bind(remark)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("record_requested"))
    }

    async fn advance_clearance(
        &self,
        subject_id: i64,
        provider_code: &str,
        advance: ClearanceAdvance,
    ) -> Result<Option<Clearance>> {
        let mut tx = self.pool.begin().await.map_err(db_error("advance_clearance"))?;

        let select = format!(
            "SELECT {CLEARANCE_COLUMNS} FROM clearances
             WHERE subject_id = $1 AND UPPER(provider_code) = UPPER($2)
             FOR UPDATE"
        );
        let Some(existing) = sqlx::query_as::<_, Clearance>(&select)
            .bind(subject_id)
            .bind(provider_code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("advance_clearance"))?
        else {
            return Ok(None);
        };

        if !existing.status.can_advance_to(advance.status) {
            return Err(ClearanceError::StateTransitionError(format!(
                "Clearance for subject {subject_id} cannot move from {} to {}",
                existing.status, advance.status
            )));
        }

        let remarks = match advance.remark.as_deref() {
            Some(remark) => Some(append_remark(existing.remarks.as_deref(), remark)),
            None => existing.remarks.clone(),
        };
        let additional_remarks = match advance.additional_remark.as_deref() {
            Some(remark) => Some(append_remark(existing.additional_remarks.as_deref(), remark)),
            None => existing.additional_remarks.clone(),
        };

        let update = format!(
            "UPDATE clearances SET
                status = $2,
                outcome = COALESCE($3, outcome),
                completion_date = COALESCE($4, completion_date),
                remarks = $5,
                additional_remarks = $6,
                updated_on = NOW()
             WHERE clearance_id = $1
             RETURNING {CLEARANCE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Clearance>(&update)
            .bind(existing.clearance_id)
            .bind(advance.status.as_str())
            .bind(&advance.outcome)
            .bind(advance.completion_date)
            .bind(remarks)
            .bind(additional_remarks)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("advance_clearance"))?;

        tx.commit().await.map_err(db_error("advance_clearance"))?;
        debug!(
            subject_id = subject_id,
            provider = %provider_code,
            status = %updated.status,
            "Clearance advanced"
        );
        Ok(Some(updated))
    }

    async fn clearances_with_status(&self, status: ClearanceStatus) -> Result<Vec<Clearance>> {
        let query = format!(
            "SELECT {CLEARANCE_COLUMNS} FROM clearances
             WHERE status = $1 ORDER BY updated_on DESC, clearance_id DESC"
        );
        sqlx::query_as::<_, Clearance>(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("clearances_with_status"))
    }
}

#[async_trait]
impl ClearanceLinkStore for PgStore {
    async fn insert_link(&self, new_link: NewClearanceLink) -> Result<ClearanceLink> {
        let query = format!(
            "INSERT INTO clearance_links (subject_id, program_id, provider_code, provider_request_id,
                is_completed, retry_count, requested_date)
             VALUES ($1, $2, $3, $4, FALSE, 0, NOW())
             RETURNING {LINK_COLUMNS}"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(new_link.subject_id)
            .bind(new_link.program_id)
            .bind(&new_link.provider_code)
            .bind(&new_link.provider_request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("insert_link"))
    }

    async fn find_open_link(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links
             WHERE subject_id = $1 AND program_id = $2 AND UPPER(provider_code) = UPPER($3)
               AND NOT is_completed
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(subject_id)
            .bind(program_id)
            .bind(provider_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_open_link"))
    }

    async fn open_links_for_subject(
        &self,
        subject_id: i64,
        provider_code: &str,
    ) -> Result<Vec<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links
             WHERE subject_id = $1 AND UPPER(provider_code) = UPPER($2) AND NOT is_completed"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(subject_id)
            .bind(provider_code)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("open_links_for_subject"))
    }

    async fn find_open_by_request_id(
        &self,
        provider_code: &str,
        request_id: &str,
    ) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links
             WHERE UPPER(provider_code) = UPPER($1) AND provider_request_id = $2 AND NOT is_completed
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(provider_code)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_open_by_request_id"))
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links WHERE provider_request_id = $1
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_by_request_id"))
    }

    async fn find_by_response_id(&self, response_id: &str) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links WHERE provider_response_id = $1
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(response_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_by_response_id"))
    }

    async fn latest_link_for_subject(
        &self,
        subject_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links
             WHERE subject_id = $1 AND ($2::TEXT IS NULL OR UPPER(provider_code) = UPPER($2))
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(subject_id)
            .bind(provider_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("latest_link_for_subject"))
    }

    async fn latest_link_for_program(
        &self,
        program_id: i64,
        provider_code: Option<&str>,
    ) -> Result<Option<ClearanceLink>> {
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM clearance_links
             WHERE program_id = $1 AND ($2::TEXT IS NULL OR UPPER(provider_code) = UPPER($2))
             ORDER BY requested_date DESC, link_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(program_id)
            .bind(provider_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("latest_link_for_program"))
    }

    async fn complete_link(&self, link_id: i64, completion: LinkCompletion) -> Result<ClearanceLink> {
        let response_id = completion
            .provider_response_id
            .filter(|id| !id.trim().is_empty());
        let query = format!(
            "UPDATE clearance_links SET
                provider_response_id = COALESCE($2, provider_response_id),
                is_completed = TRUE,
                completion_date = $3,
                updated_on = NOW()
             WHERE link_id = $1
             RETURNING {LINK_COLUMNS}"
        );
        sqlx::query_as::<_, ClearanceLink>(&query)
            .bind(link_id)
            .bind(response_id)
            .bind(completion.completion_date)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("complete_link"))
    }
}

#[async_trait]
impl SubjectDirectory for PgStore {
    async fn find_subject(&self, subject_id: i64) -> Result<Option<Subject>> {
        sqlx::query_as::<_, Subject>(
            "SELECT subject_id, index_no, first_name, middle_name, last_name, gender, date_of_birth,
                    nationality, nationality_iso_code, country_of_birth, country_of_birth_iso_code,
                    email_address
             FROM subjects WHERE subject_id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find_subject"))
    }

    async fn find_program(&self, program_id: i64) -> Result<Option<Program>> {
        sqlx::query_as::<_, Program>(
            "SELECT program_id, subject_id, deployment_id, department, requestor_name, requestor_email,
                    employee_type, functional_title, duty_station_code, duty_station_description,
                    start_date, end_date, requested_on
             FROM programs WHERE program_id = $1",
        )
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find_program"))
    }

    async fn latest_program_for_subject(&self, subject_id: i64) -> Result<Option<Program>> {
        sqlx::query_as::<_, Program>(
            "SELECT program_id, subject_id, deployment_id, department, requestor_name, requestor_email,
                    employee_type, functional_title, duty_station_code, duty_station_description,
                    start_date, end_date, requested_on
             FROM programs WHERE subject_id = $1
             ORDER BY requested_on DESC, program_id DESC LIMIT 1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("latest_program_for_subject"))
    }
}

#[async_trait]
impl EndpointCatalog for PgStore {
    async fn active_endpoint(
        &self,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<Option<EndpointDefinition>> {
        sqlx::query_as::<_, EndpointDefinition>(
            "SELECT endpoint_id, provider_code, operation_code, base_url, path_template, http_method,
                    timeout_seconds, payload_template, required_models, retrigger, retrigger_count,
                    retrigger_interval_minutes, is_active
             FROM integration_endpoints
             WHERE UPPER(provider_code) = UPPER($1) AND operation_code = $2 AND is_active
             ORDER BY endpoint_id DESC LIMIT 1",
        )
        .bind(provider_code)
        .bind(operation_code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("active_endpoint"))
    }
}
