//! # Clearance Manager
//!
//! The caller-facing surface. Creation errors are returned to the caller;
//! everything else is logged and reported as a boolean.
//!
//! ```rust
//! use clearance_core::config::ClearanceConfig;
//! use clearance_core::engine::ClearanceEngine;
//! use clearance_core::store::{InvocationStore, MemoryStore};
//! use clearance_core::InvocationStatus;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let engine = ClearanceEngine::builder(&ClearanceConfig::default())
//!     .with_backend(store.clone())
//!     .build()
//!     .unwrap();
//!
//! // no endpoint is configured for the provider, so the first attempt is retried later
//! let id = engine.manager().create_invocation(7, 3, "ACME").await.unwrap();
//! let invocation = store.find_invocation(id).await.unwrap().unwrap();
//! assert_eq!(invocation.status, InvocationStatus::Retry);
//! # });
//! ```

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::constants::OperationCode;
use crate::error::{ClearanceError, Result};
use crate::models::NewInvocation;
use crate::resolver::Bootstrap;
use crate::scheduler::{ClearanceSweeps, SweepReport};
use crate::store::Stores;

pub struct ClearanceManager {
    stores: Stores,
    sweeps: Arc<ClearanceSweeps>,
}

impl ClearanceManager {
    pub fn new(stores: Stores, sweeps: Arc<ClearanceSweeps>) -> Self {
        Self { stores, sweeps }
    }

    pub fn sweeps(&self) -> &Arc<ClearanceSweeps> {
        &self.sweeps
    }

    /// Create a clearance request invocation and run its first attempt
    pub async fn create_invocation(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<i64> {
        self.create_operation_invocation(
            subject_id,
            program_id,
            provider_code,
            OperationCode::CreateClearanceRequest,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn create_operation_invocation(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
        operation_code: OperationCode,
    ) -> Result<i64> {
        let provider_code = provider_code.trim();
        if provider_code.is_empty() {
            return Err(ClearanceError::ValidationError(
                "Provider code is required".to_string(),
            ));
        }
        let bootstrap = Bootstrap::new(subject_id, program_id);
        if bootstrap.is_empty() {
            return Err(ClearanceError::ValidationError(format!(
                "Subject or program id required (subject={subject_id}, program={program_id})"
            )));
        }

        let invocation = self
            .stores
            .invocations
            .create_invocation(
                NewInvocation::new(provider_code, operation_code)
                    .with_identity(bootstrap.identity_body()),
            )
            .await?;
        info!(
            invocation_id = invocation.invocation_id,
            provider = %provider_code,
            operation = %operation_code,
            "Invocation created"
        );

        if let Err(e) = self
            .sweeps
            .queue()
            .submit(invocation.invocation_id, Some(bootstrap))
            .await
        {
            error!(invocation_id = invocation.invocation_id, error = %e, "First attempt failed");
        }
        Ok(invocation.invocation_id)
    }

    pub async fn process_pending_invocations(&self) -> bool {
        report_ok(self.sweeps.run_pending().await)
    }

    pub async fn process_retryable_invocations(&self) -> bool {
        report_ok(self.sweeps.run_retries().await)
    }

    pub async fn process_open_clearances(&self) -> bool {
        report_ok(self.sweeps.poll_status().await)
    }

    pub async fn process_acknowledge(&self) -> bool {
        report_ok(self.sweeps.poll_acknowledge().await)
    }

    /// Start cycle 1 for a subject's program with a provider
    pub async fn execute_full_clearance_cycle(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> bool {
        match self.create_invocation(subject_id, program_id, provider_code).await {
            Ok(invocation_id) => {
                info!(invocation_id, "Clearance cycle started");
                true
            }
            Err(e) => {
                error!(subject_id, program_id, provider = %provider_code, error = %e, "Failed to start clearance cycle");
                false
            }
        }
    }

    /// Start whichever cycle comes next for the case: status while the link is
    /// open, acknowledge once a response id exists and the clearance is not
    /// yet delivered
    #[instrument(skip(self))]
    pub async fn check_and_progress_clearance(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> bool {
        match self
            .progress_clearance(subject_id, program_id, provider_code)
            .await
        {
            Ok(progressed) => progressed,
            Err(e) => {
                error!(error = %e, "Failed to progress clearance");
                false
            }
        }
    }

    async fn progress_clearance(
        &self,
        subject_id: i64,
        program_id: i64,
        provider_code: &str,
    ) -> Result<bool> {
        let links = &self.stores.links;
        let link = match links
            .find_open_link(subject_id, program_id, provider_code)
            .await?
        {
            Some(link) => Some(link),
            None => links
                .latest_link_for_program(program_id, Some(provider_code))
                .await?
                .filter(|link| link.subject_id == subject_id),
        };
        let Some(link) = link else {
            warn!("No clearance link found");
            return Ok(false);
        };

        let Some(clearance) = self
            .stores
            .clearances
            .find_clearance(subject_id, provider_code)
            .await?
        else {
            warn!("No clearance summary found");
            return Ok(false);
        };

        if link.request_id().is_some() && !link.is_completed {
            info!(request_id = ?link.provider_request_id, "Checking clearance status");
            self.create_operation_invocation(
                subject_id,
                program_id,
                provider_code,
                OperationCode::GetClearanceStatus,
            )
            .await?;
            return Ok(true);
        }

        if link.response_id().is_some() && !clearance.status.is_delivered() {
            info!(response_id = ?link.provider_response_id, "Sending acknowledgement");
            self.create_operation_invocation(
                subject_id,
                program_id,
                provider_code,
                OperationCode::AcknowledgeResponse,
            )
            .await?;
            return Ok(true);
        }

        info!("Clearance cycle complete");
        Ok(true)
    }
}

fn report_ok(report: Result<SweepReport>) -> bool {
    match report {
        Ok(_) => true,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Sweep failed");
            false
        }
    }
}
