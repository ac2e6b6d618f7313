mod common;

use chrono::{Datelike, Utc};
use common::*;

use clearance_core::constants::{OperationCode, OUTCOME_COMPLETE, REMARK_ACKNOWLEDGED};
use clearance_core::models::NewClearanceLink;
use clearance_core::providers::ProtocolKind;
use clearance_core::store::{ClearanceLinkStore, ClearanceStore, InvocationStore};
use clearance_core::{ClearanceStatus, InvocationStatus};

const EARTH: &str = "EARTH";
const MEDX: &str = "MEDX";

fn batched_harness() -> Harness {
    Harness::new(
        vec![provider(EARTH, ProtocolKind::Batched)],
        vec![
            EndpointBuilder::new(EARTH, OperationCode::CreateClearanceRequest)
                .template(r#"{"ReferenceNumber": "{{ProviderRequest.ReferenceNumber}}", "IndexNumber": "{{ProviderRequest.IndexNumber}}"}"#)
                .build(),
            EndpointBuilder::new(EARTH, OperationCode::GetClearanceStatus)
                .path("clearance/status")
                .build(),
            EndpointBuilder::new(EARTH, OperationCode::AcknowledgeResponse)
                .path("ack")
                .build(),
        ],
    )
}

fn acknowledged_harness() -> Harness {
    Harness::new(
        vec![provider(MEDX, ProtocolKind::Acknowledged)],
        vec![
            EndpointBuilder::new(MEDX, OperationCode::CreateClearanceRequest).build(),
            EndpointBuilder::new(MEDX, OperationCode::GetClearanceStatus)
                .path("status/{id}")
                .template(r#"{"SubjectId": {{SubjectId}}, "ProgramId": {{ProgramId}}, "clearanceRequestId": "{{ClearanceLink.ProviderRequestId}}"}"#)
                .build(),
            EndpointBuilder::new(MEDX, OperationCode::AcknowledgeResponse)
                .path("responses/{id}/acknowledge")
                .build(),
        ],
    )
}

async fn open_case(harness: &Harness, provider_code: &str, subject_id: i64, program_id: i64, request_id: &str) {
    harness
        .store
        .insert_link(NewClearanceLink {
            subject_id,
            program_id,
            provider_code: provider_code.to_string(),
            provider_request_id: request_id.to_string(),
        })
        .await
        .unwrap();
    harness
        .store
        .record_requested(subject_id, provider_code, &format!("clearanceRequestId={request_id}"), Utc::now())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_batch_status_completes_matched_cases_and_skips_the_rest() {
    let harness = batched_harness();
    open_case(&harness, EARTH, 11, 101, "900").await;
    open_case(&harness, EARTH, 12, 102, "901").await;
    harness.transport.respond(
        200,
        r#"{
            "IsSuccess": true,
            "Result": [
                {"Id": 5001, "IndexNumber": "11", "ReferenceNumber": "101_11", "ClearanceStatus": "Fit", "ClearanceDate": "2026-10-01T00:00:00"},
                {"Id": 5002, "IndexNumber": "12", "ReferenceNumber": "102_12", "ClearanceStatus": "Fit", "ClearanceDate": "2026-10-02T00:00:00"},
                {"Id": 5003, "IndexNumber": "13", "ReferenceNumber": "103_13", "ClearanceStatus": "Fit", "ClearanceDate": "2026-10-03T00:00:00"}
            ]
        }"#,
    );

    let invocation_id = harness
        .engine
        .manager()
        .create_operation_invocation(11, 101, EARTH, OperationCode::GetClearanceStatus)
        .await
        .unwrap();

    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);

    let links = harness.store.links();
    assert_eq!(links.len(), 2);
    for link in &links {
        assert!(link.is_completed, "link {} should be completed", link.link_id);
    }
    let a = links.iter().find(|link| link.subject_id == 11).unwrap();
    assert_eq!(a.provider_request_id.as_deref(), Some("900"));
    assert_eq!(a.provider_response_id.as_deref(), Some("5001"));
    assert_eq!(a.completion_date.unwrap().day(), 1);

    for subject_id in [11, 12] {
        let clearance = harness.store.find_clearance(subject_id, EARTH).await.unwrap().unwrap();
        assert_eq!(clearance.status, ClearanceStatus::Delivered);
        assert_eq!(clearance.outcome.as_deref(), Some(OUTCOME_COMPLETE));
    }
    assert!(harness.store.find_clearance(13, EARTH).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_result_without_reference_matches_unique_open_link_by_index() {
    let harness = batched_harness();
    open_case(&harness, EARTH, 21, 201, "910").await;
    harness.transport.respond(
        200,
        r#"{"Result": [{"Id": 6001, "IndexNumber": 21, "ClearanceStatus": "Fit"}]}"#,
    );

    harness
        .engine
        .manager()
        .create_operation_invocation(21, 201, EARTH, OperationCode::GetClearanceStatus)
        .await
        .unwrap();

    let link = &harness.store.links()[0];
    assert!(link.is_completed);
    assert_eq!(link.provider_response_id.as_deref(), Some("6001"));
}

#[tokio::test]
async fn test_batched_create_records_result_id() {
    let harness = batched_harness();
    harness.store.insert_subject(subject(31, "Lena", "Moreau"));
    harness.store.insert_program(program(301, 31));
    harness.transport.respond(200, r#"{"IsSuccess": true, "Result": {"Id": 981}}"#);

    harness.engine.manager().create_invocation(31, 301, EARTH).await.unwrap();

    let body = harness.transport.sent()[0].body.clone().unwrap();
    assert_eq!(body, r#"{"ReferenceNumber": "301_31", "IndexNumber": "IDX31"}"#);
    let link = harness.store.find_open_link(31, 301, EARTH).await.unwrap().unwrap();
    assert_eq!(link.provider_request_id.as_deref(), Some("981"));
}

#[tokio::test]
async fn test_acknowledge_on_two_cycle_provider_is_a_no_op() {
    let harness = batched_harness();
    open_case(&harness, EARTH, 41, 401, "920").await;
    let before = harness.store.find_clearance(41, EARTH).await.unwrap().unwrap();
    harness.transport.respond(200, "");

    let invocation_id = harness
        .engine
        .manager()
        .create_operation_invocation(41, 401, EARTH, OperationCode::AcknowledgeResponse)
        .await
        .unwrap_or_else(|e| panic!("acknowledge should not fail: {e}"));

    let invocation = harness.store.find_invocation(invocation_id).await.unwrap().unwrap();
    assert_eq!(invocation.status, InvocationStatus::Success);
    let after = harness.store.find_clearance(41, EARTH).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_three_cycle_protocol_runs_to_delivered() {
    let harness = acknowledged_harness();
    let manager = harness.engine.manager();

    harness.transport.respond(200, r#"{"clearanceRequestId": "CR-1"}"#);
    assert!(manager.execute_full_clearance_cycle(7, 3, MEDX).await);
    assert_eq!(
        harness.store.find_clearance(7, MEDX).await.unwrap().unwrap().status,
        ClearanceStatus::Requested
    );

    harness.transport.respond(200, r#"{"clearanceResponseId": "RS-1", "status": "CLEARED", "statusDate": "2026-10-10"}"#);
    assert!(manager.check_and_progress_clearance(7, 3, MEDX).await);
    let link = harness.store.links().pop().unwrap();
    assert!(link.is_completed);
    assert_eq!(link.provider_request_id.as_deref(), Some("CR-1"));
    assert_eq!(link.provider_response_id.as_deref(), Some("RS-1"));
    let cleared = harness.store.find_clearance(7, MEDX).await.unwrap().unwrap();
    assert_eq!(cleared.status, ClearanceStatus::Cleared);
    assert_eq!(cleared.outcome, None);

    harness.transport.respond(200, "");
    assert!(manager.check_and_progress_clearance(7, 3, MEDX).await);
    let delivered = harness.store.find_clearance(7, MEDX).await.unwrap().unwrap();
    assert_eq!(delivered.status, ClearanceStatus::Delivered);
    assert_eq!(delivered.outcome.as_deref(), Some(OUTCOME_COMPLETE));
    assert_eq!(delivered.additional_remarks.as_deref(), Some(REMARK_ACKNOWLEDGED));
    assert_eq!(
        delivered.remarks.as_deref(),
        Some("clearanceRequestId=CR-1;clearanceResponseId=RS-1")
    );

    let urls: Vec<String> = harness.transport.sent().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://medx.provider.test/api".to_string(),
            "https://medx.provider.test/api/status/CR-1".to_string(),
            "https://medx.provider.test/api/responses/RS-1/acknowledge".to_string(),
        ]
    );

    // nothing left to do once delivered
    assert!(manager.check_and_progress_clearance(7, 3, MEDX).await);
    assert_eq!(harness.transport.sent_count(), 3);
}

#[tokio::test]
async fn test_status_never_overwrites_request_id() {
    let harness = acknowledged_harness();
    open_case(&harness, MEDX, 8, 4, "CR-8").await;
    harness.transport.respond(
        200,
        r#"{"clearanceRequestId": "OTHER", "clearanceResponseId": "RS-8"}"#,
    );

    harness
        .engine
        .manager()
        .create_operation_invocation(8, 4, MEDX, OperationCode::GetClearanceStatus)
        .await
        .unwrap();

    let link = harness.store.links().pop().unwrap();
    assert_eq!(link.provider_request_id.as_deref(), Some("CR-8"));
    assert_eq!(link.provider_response_id.as_deref(), Some("RS-8"));
}
