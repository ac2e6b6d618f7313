mod common;

use chrono::Utc;
use std::time::Duration;

use common::*;

use clearance_core::config::{ClearanceConfig, SchedulerConfig};
use clearance_core::constants::{OperationCode, OUTCOME_COMPLETE};
use clearance_core::engine::ClearanceEngine;
use clearance_core::models::{NewClearanceLink, NewInvocation};
use clearance_core::providers::ProtocolKind;
use clearance_core::resolver::Bootstrap;
use clearance_core::scheduler::ExecutionMode;
use clearance_core::store::{
    ClearanceLinkStore, ClearanceStore, InvocationStore, MemoryStore, StaticEndpointCatalog,
};
use clearance_core::{ClearanceStatus, InvocationStatus};
use std::sync::Arc;

const MEDX: &str = "MEDX";

const STATUS_TEMPLATE: &str = r#"{"SubjectId": {{SubjectId}}, "ProgramId": {{ProgramId}}, "clearanceRequestId": "{{ClearanceLink.ProviderRequestId}}"}"#;

fn polling_harness(status_budget: i32) -> Harness {
    Harness::new(
        vec![provider(MEDX, ProtocolKind::Acknowledged)],
        vec![
            EndpointBuilder::new(MEDX, OperationCode::CreateClearanceRequest).build(),
            EndpointBuilder::new(MEDX, OperationCode::GetClearanceStatus)
                .path("status/{id}")
                .method("GET")
                .template(STATUS_TEMPLATE)
                .retries(status_budget, 1)
                .build(),
            EndpointBuilder::new(MEDX, OperationCode::AcknowledgeResponse)
                .path("responses/{id}/acknowledge")
                .build(),
        ],
    )
}

async fn open_case(harness: &Harness, subject_id: i64, program_id: i64, request_id: &str) {
    harness
        .store
        .insert_link(NewClearanceLink {
            subject_id,
            program_id,
            provider_code: MEDX.to_string(),
            provider_request_id: request_id.to_string(),
        })
        .await
        .unwrap();
    harness
        .store
        .record_requested(subject_id, MEDX, &format!("clearanceRequestId={request_id}"), Utc::now())
        .await
        .unwrap();
}

async fn status_invocations(harness: &Harness) -> Vec<clearance_core::models::Invocation> {
    harness
        .store
        .invocations_for_operation(MEDX, OperationCode::GetClearanceStatus)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_status_poll_rearms_until_budget_is_spent() {
    let harness = polling_harness(2);
    open_case(&harness, 7, 3, "CR-1").await;
    let manager = harness.engine.manager();

    // first sweep creates the status invocation, which fails once
    assert!(manager.process_open_clearances().await);
    let invocations = status_invocations(&harness).await;
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].status, InvocationStatus::Retry);
    assert_eq!(invocations[0].attempt_count, 1);

    // second sweep finds it through its logged identity and re-arms it
    assert!(manager.process_open_clearances().await);
    let invocations = status_invocations(&harness).await;
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].attempt_count, 2);
    assert_eq!(invocations[0].status, InvocationStatus::PermanentlyFailed);
    assert_eq!(harness.transport.sent_count(), 2);

    // budget spent: even a row put back to RETRY is left alone
    let mut exhausted = invocations[0].clone();
    exhausted.status = InvocationStatus::Retry;
    harness.store.put_invocation(exhausted);
    assert!(manager.process_open_clearances().await);
    assert_eq!(harness.transport.sent_count(), 2);
    assert_eq!(status_invocations(&harness).await.len(), 1);

    let sent = harness.transport.sent();
    assert!(sent.iter().all(|r| r.url == "https://medx.provider.test/api/status/CR-1"));
    assert!(sent.iter().all(|r| r.method == "GET"));
}

#[tokio::test]
async fn test_successful_status_invocation_is_rearmed_on_next_poll() {
    let harness = polling_harness(5);
    open_case(&harness, 7, 3, "CR-1").await;
    harness.transport.respond(200, r#"{"status": "IN_REVIEW"}"#);
    harness.transport.respond(200, r#"{"status": "IN_REVIEW"}"#);
    let manager = harness.engine.manager();

    manager.process_open_clearances().await;
    manager.process_open_clearances().await;

    let invocations = status_invocations(&harness).await;
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].status, InvocationStatus::Success);
    assert_eq!(invocations[0].attempt_count, 2);
    assert_eq!(
        harness.store.find_clearance(7, MEDX).await.unwrap().unwrap().status,
        ClearanceStatus::Requested
    );
}

#[tokio::test]
async fn test_status_and_acknowledge_sweeps_deliver_a_case() {
    let harness = polling_harness(3);
    open_case(&harness, 9, 4, "CR-9").await;
    harness
        .transport
        .respond(200, r#"{"clearanceResponseId": "RS-9", "status": "CLEARED"}"#);
    harness.transport.respond(204, "");
    let manager = harness.engine.manager();

    assert!(manager.process_open_clearances().await);
    assert_eq!(
        harness.store.find_clearance(9, MEDX).await.unwrap().unwrap().status,
        ClearanceStatus::Cleared
    );

    // the completed link is no longer polled
    assert!(manager.process_open_clearances().await);
    assert_eq!(harness.transport.sent_count(), 1);

    assert!(manager.process_acknowledge().await);
    let clearance = harness.store.find_clearance(9, MEDX).await.unwrap().unwrap();
    assert_eq!(clearance.status, ClearanceStatus::Delivered);
    assert_eq!(clearance.outcome.as_deref(), Some(OUTCOME_COMPLETE));
    assert_eq!(
        harness.transport.sent()[1].url,
        "https://medx.provider.test/api/responses/RS-9/acknowledge"
    );
}

#[tokio::test]
async fn test_pending_sweep_runs_rows_without_bootstrap() {
    let harness = polling_harness(3);
    let created = harness
        .store
        .create_invocation(NewInvocation::new(MEDX, OperationCode::CreateClearanceRequest))
        .await
        .unwrap();

    assert!(harness.engine.manager().process_pending_invocations().await);

    // nothing logged to rebuild the ids from
    let invocation = harness
        .store
        .find_invocation(created.invocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invocation.status, InvocationStatus::PermanentlyFailed);
    assert_eq!(harness.transport.sent_count(), 0);
}

#[tokio::test]
async fn test_body_less_status_poll_is_matched_and_capped() {
    let harness = Harness::new(
        vec![provider(MEDX, ProtocolKind::Acknowledged)],
        vec![EndpointBuilder::new(MEDX, OperationCode::GetClearanceStatus)
            .path("status/{id}")
            .method("GET")
            .template("")
            .retries(2, 1)
            .build()],
    );
    open_case(&harness, 7, 3, "R-1").await;
    for _ in 0..5 {
        harness.transport.respond(200, r#"{"status": "IN_REVIEW"}"#);
    }
    let manager = harness.engine.manager();

    for _ in 0..5 {
        assert!(manager.process_open_clearances().await);
    }

    let invocations = status_invocations(&harness).await;
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].attempt_count, 2);
    assert_eq!(harness.transport.sent_count(), 2);
    assert!(harness.transport.sent().iter().all(|r| r.body.is_none()));
}

#[tokio::test]
async fn test_each_open_case_keeps_its_own_status_invocation() {
    let harness = polling_harness(3);
    open_case(&harness, 7, 3, "CR-1").await;
    open_case(&harness, 8, 4, "CR-2").await;
    open_case(&harness, 9, 5, "CR-3").await;
    let manager = harness.engine.manager();

    assert!(manager.process_open_clearances().await);
    assert!(manager.process_open_clearances().await);

    let invocations = status_invocations(&harness).await;
    assert_eq!(invocations.len(), 3);
    assert!(invocations.iter().all(|i| i.attempt_count == 2));

    // every case was polled twice under its own request id
    let mut urls: Vec<String> = harness.transport.sent().into_iter().map(|r| r.url).collect();
    urls.sort();
    let expected: Vec<String> = ["CR-1", "CR-1", "CR-2", "CR-2", "CR-3", "CR-3"]
        .iter()
        .map(|id| format!("https://medx.provider.test/api/status/{id}"))
        .collect();
    assert_eq!(urls, expected);
}

#[tokio::test]
async fn test_pending_sweep_runs_rows_created_with_identity() {
    let harness = polling_harness(3);
    harness.transport.respond(200, r#"{"clearanceRequestId": "R-3"}"#);
    // created but not yet submitted when the sweep got to it
    let created = harness
        .store
        .create_invocation(
            NewInvocation::new(MEDX, OperationCode::CreateClearanceRequest)
                .with_identity(Bootstrap::new(7, 3).identity_body()),
        )
        .await
        .unwrap();

    assert!(harness.engine.manager().process_pending_invocations().await);

    let invocation = harness
        .store
        .find_invocation(created.invocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);
    assert!(harness.store.find_open_link(7, 3, MEDX).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unregistered_provider_is_skipped_by_status_poll() {
    let harness = polling_harness(3);
    harness
        .store
        .insert_link(NewClearanceLink {
            subject_id: 1,
            program_id: 2,
            provider_code: "GHOST".to_string(),
            provider_request_id: "G-1".to_string(),
        })
        .await
        .unwrap();
    harness
        .store
        .record_requested(1, "GHOST", "clearanceRequestId=G-1", Utc::now())
        .await
        .unwrap();

    let report = harness.engine.sweeps().poll_status().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(harness.transport.sent_count(), 0);
}

#[tokio::test]
async fn test_periodic_scheduler_starts_four_loops_and_stops() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new();
    let config = ClearanceConfig {
        environment: "test".to_string(),
        providers: vec![provider(MEDX, ProtocolKind::Acknowledged)],
        scheduler: SchedulerConfig {
            pending_interval_seconds: 1,
            retry_interval_seconds: 1,
            status_poll_interval_seconds: 3600,
            acknowledge_interval_seconds: 3600,
            ..SchedulerConfig::default()
        },
        ..ClearanceConfig::default()
    };
    let engine = ClearanceEngine::builder(&config)
        .with_backend(store.clone())
        .with_catalog(Arc::new(StaticEndpointCatalog::new(vec![EndpointBuilder::new(
            MEDX,
            OperationCode::CreateClearanceRequest,
        )
        .build()])))
        .with_transport(transport.clone())
        .with_token_fetcher(Arc::new(StaticTokenFetcher::new("t")))
        .with_execution_mode(ExecutionMode::Inline)
        .build()
        .unwrap();

    let handle = engine.scheduler().start();
    assert_eq!(handle.running_loops(), 4);
    // first ticks fire immediately and find nothing to do
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await;

    assert_eq!(transport.sent_count(), 0);
}
