mod common;

use chrono::{Duration, Utc};
use common::*;

use clearance_core::constants::OperationCode;
use clearance_core::providers::ProtocolKind;
use clearance_core::store::{ClearanceLinkStore, ClearanceStore, InvocationLogStore, InvocationStore};
use clearance_core::{ClearanceStatus, InvocationStatus};

fn create_harness(retries: i32) -> Harness {
    Harness::new(
        vec![provider("X", ProtocolKind::Acknowledged)],
        vec![EndpointBuilder::new("X", OperationCode::CreateClearanceRequest)
            .path("clearances")
            .retries(retries, 1)
            .build()],
    )
}

/// Make a RETRY row due now, the way the clock would
async fn make_due(harness: &Harness, invocation_id: i64) {
    let mut invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    invocation.next_retry_time = Some(Utc::now() - Duration::seconds(1));
    harness.store.put_invocation(invocation);
}

#[tokio::test]
async fn test_two_failures_then_success_records_request() {
    let harness = create_harness(3);
    harness.transport.respond(500, "upstream down");
    harness.transport.respond(500, "upstream down");
    harness.transport.respond(200, r#"{"requestId":"R-99"}"#);
    let manager = harness.engine.manager();

    let invocation_id = manager.create_invocation(7, 3, "X").await.unwrap();
    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Retry);
    assert_eq!(invocation.attempt_count, 1);
    assert!(invocation.next_retry_time.unwrap() > Utc::now() + Duration::seconds(50));

    make_due(&harness, invocation_id).await;
    assert!(manager.process_retryable_invocations().await);
    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Retry);
    assert_eq!(invocation.attempt_count, 2);

    make_due(&harness, invocation_id).await;
    assert!(manager.process_retryable_invocations().await);
    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);
    assert_eq!(invocation.attempt_count, 3);
    assert_eq!(invocation.next_retry_time, None);

    let link = harness.store.find_open_link(7, 3, "X").await.unwrap().unwrap();
    assert_eq!(link.provider_request_id.as_deref(), Some("R-99"));
    assert!(!link.is_completed);
    let clearance = harness.store.find_clearance(7, "X").await.unwrap().unwrap();
    assert_eq!(clearance.status, ClearanceStatus::Requested);

    // the retries rebuilt the same body from the logged identity
    let bodies: Vec<_> = harness
        .transport
        .sent()
        .into_iter()
        .map(|request| request.body)
        .collect();
    assert_eq!(bodies.len(), 3);
    assert!(bodies.iter().all(|body| body == &bodies[0]));
}

#[tokio::test]
async fn test_budget_exhaustion_is_permanent() {
    let harness = create_harness(2);
    let manager = harness.engine.manager();

    let invocation_id = manager.create_invocation(7, 3, "X").await.unwrap();
    make_due(&harness, invocation_id).await;
    manager.process_retryable_invocations().await;

    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::PermanentlyFailed);
    assert_eq!(invocation.attempt_count, 2);

    // terminal rows are never picked up again
    make_due(&harness, invocation_id).await;
    manager.process_retryable_invocations().await;
    assert_eq!(harness.transport.sent_count(), 2);
}

#[tokio::test]
async fn test_every_attempt_leaves_ordered_log_rows() {
    let harness = create_harness(3);
    harness.transport.respond(502, "bad gateway");
    harness.transport.respond(201, r#"{"clearanceRequestId": "R-1"}"#);
    let manager = harness.engine.manager();

    let invocation_id = manager.create_invocation(7, 3, "X").await.unwrap();
    make_due(&harness, invocation_id).await;
    manager.process_retryable_invocations().await;

    let logs = harness.store.logs_for_invocation(invocation_id).await.unwrap();
    let sequences: Vec<i32> = logs.iter().map(|log| log.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    // identity row, never sent
    assert!(logs[0].has_request_body());
    assert_eq!(logs[0].request_sent_on, None);
    assert!(logs[1].has_request_body());
    assert!(logs[1].request_sent_on.is_some());
    assert_eq!(logs[2].response_status_code, Some(502));
    assert!(logs[2]
        .error_details
        .as_deref()
        .unwrap()
        .starts_with("HTTP 502 | Error:"));
    assert_eq!(logs[4].response_status_code, Some(201));
    assert_eq!(logs[4].error_details, None);
}

#[tokio::test]
async fn test_missing_endpoint_is_retried_once_configured() {
    let providers = vec![provider("X", ProtocolKind::Acknowledged)];
    let unconfigured = Harness::new(providers.clone(), Vec::new());

    let invocation_id = unconfigured
        .engine
        .manager()
        .create_invocation(7, 3, "X")
        .await
        .unwrap();
    let invocation = unconfigured.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Retry);
    assert_eq!(unconfigured.transport.sent_count(), 0);

    // endpoint added and the service restarted over the same rows
    let configured = Harness::on_store(
        unconfigured.store.clone(),
        providers,
        vec![EndpointBuilder::new("X", OperationCode::CreateClearanceRequest)
            .path("clearances")
            .retries(3, 1)
            .build()],
    );
    configured.transport.respond(200, r#"{"clearanceRequestId": "R-7"}"#);
    make_due(&configured, invocation_id).await;
    assert!(configured.engine.manager().process_retryable_invocations().await);

    let invocation = configured.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);
    assert_eq!(invocation.attempt_count, 2);
    assert_eq!(configured.transport.sent_count(), 1);
    let link = configured.store.find_open_link(7, 3, "X").await.unwrap().unwrap();
    assert_eq!(link.provider_request_id.as_deref(), Some("R-7"));
}

#[tokio::test]
async fn test_created_invocation_has_identity_before_first_send() {
    let providers = vec![provider("X", ProtocolKind::Acknowledged)];
    let harness = Harness::new(providers, Vec::new());

    let invocation_id = harness.engine.manager().create_invocation(7, 3, "X").await.unwrap();

    // the attempt failed before any request row; the identity row is all there is
    let logs = harness.store.logs_for_invocation(invocation_id).await.unwrap();
    assert_eq!(logs[0].sequence, 1);
    assert!(logs[0].has_request_body());
    assert!(logs.iter().all(|log| log.request_sent_on.is_none()));
    let body: serde_json::Value =
        serde_json::from_str(logs[0].request_payload.as_deref().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({"SubjectId": 7, "ProgramId": 3}));
}

#[tokio::test]
async fn test_create_rejects_missing_identity() {
    let harness = create_harness(3);
    let manager = harness.engine.manager();
    assert!(manager.create_invocation(0, 0, "X").await.is_err());
    assert!(manager.create_invocation(7, 3, "  ").await.is_err());
    assert_eq!(harness.transport.sent_count(), 0);
}

#[tokio::test]
async fn test_program_only_bootstrap_resolves_subject_through_relation() {
    let harness = create_harness(3);
    harness.store.insert_subject(subject(7, "Amina", "Odhiambo"));
    harness.store.insert_program(program(3, 7));
    harness.transport.respond(200, r#"{"clearanceRequestId": "R-5"}"#);

    let invocation_id = harness.engine.manager().create_invocation(0, 3, "X").await.unwrap();
    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);
    assert!(harness.store.find_open_link(7, 3, "X").await.unwrap().is_some());
}

#[tokio::test]
async fn test_rejected_token_is_refetched_next_attempt() {
    let harness = Harness::new(
        vec![authenticated_provider("X", ProtocolKind::Acknowledged)],
        vec![EndpointBuilder::new("X", OperationCode::CreateClearanceRequest).build()],
    );
    harness.transport.respond(401, "");
    harness.transport.respond(200, r#"{"clearanceRequestId": "R-2"}"#);
    let manager = harness.engine.manager();

    let invocation_id = manager.create_invocation(7, 3, "X").await.unwrap();
    assert!(!harness.engine.tokens().has_cached_token("X"));
    make_due(&harness, invocation_id).await;
    manager.process_retryable_invocations().await;

    let sent = harness.transport.sent();
    assert_eq!(sent[0].header("Authorization"), Some("Bearer test-token-1"));
    assert_eq!(sent[1].header("Authorization"), Some("Bearer test-token-2"));
}
