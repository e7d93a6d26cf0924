//! Durable recording and business-table writes against Postgres.
//!
//! Uses `rcm-test-utils`: a container-backed server, or the one named by
//! `RCM_TEST_PG_URL`. Each test gets its own migrated database.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;

use rcm_core::agents::{AppealLetterAgent, CodingAgent, DenialClassifierAgent, SubmitClaimAgent};
use rcm_core::collab::memory::ScriptedClearinghouse;
use rcm_core::collab::{PgBusinessStore, SubmissionReceipt, SubmissionStatus};
use rcm_core::inference::{InferenceError, ScriptedInference};
use rcm_core::recorder::{NewAgentRun, PgRunRecorder, RunRecorder};
use rcm_core::{Agent, AgentRequest, Collaborators, Dispatch, ExecutionHarness};
use rcm_db::models::RunStatus;
use rcm_db::queries::{agent_runs, appeals, claims, denials};
use rcm_test_utils::{create_test_db, drop_test_db};

fn request(value: serde_json::Value) -> AgentRequest {
    AgentRequest::try_from(value).unwrap()
}

fn coding_request() -> AgentRequest {
    request(json!({
        "patientData": {"age": 30},
        "encounterData": {"type": "office_visit"},
        "chartNotes": "Sore throat for three days."
    }))
}

fn production(pool: &PgPool, inference: ScriptedInference, clearinghouse: ScriptedClearinghouse) -> Dispatch {
    Dispatch::Production(Collaborators {
        inference: Arc::new(inference),
        store: Arc::new(PgBusinessStore::new(pool.clone())),
        clearinghouse: Arc::new(clearinghouse),
    })
}

fn harness(pool: &PgPool, agent: impl Agent + 'static, dispatch: Dispatch) -> ExecutionHarness {
    ExecutionHarness::new(
        Arc::new(agent),
        Arc::new(PgRunRecorder::new(pool.clone())),
        dispatch,
    )
}

#[tokio::test]
async fn completed_run_is_persisted_with_consistent_timing() {
    let (pool, db_name) = create_test_db().await;

    let envelope = harness(&pool, CodingAgent, Dispatch::Development)
        .handle(coding_request())
        .await;
    assert!(envelope.success);

    let run = agent_runs::get_run(&pool, envelope.run_id)
        .await
        .unwrap()
        .expect("run should be stored");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.agent_name, "coding");
    assert_eq!(run.agent_version, "1.0.0");
    assert_eq!(run.input_data, coding_request().to_value());
    assert_eq!(run.output_data, envelope.result);
    assert!(run.error_message.is_none());

    let ms = run.execution_time_ms.unwrap();
    assert_eq!(u64::try_from(ms).unwrap(), envelope.execution_time_ms);
    let end_time = run.end_time.unwrap();
    assert_eq!((end_time - run.start_time).num_milliseconds(), ms);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_run_keeps_underlying_error() {
    let (pool, db_name) = create_test_db().await;

    let inference = ScriptedInference::new().with_error(InferenceError::Api {
        status: 503,
        message: "model overloaded".into(),
    });
    let dispatch = production(&pool, inference, ScriptedClearinghouse::new());
    let envelope = harness(&pool, CodingAgent, dispatch)
        .handle(coding_request())
        .await;
    assert_eq!(envelope.error.as_deref(), Some("coding execution failed"));

    let run = agent_runs::get_run(&pool, envelope.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.output_data.is_none());
    let message = run.error_message.unwrap();
    assert!(message.contains("model overloaded"), "{message}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn rejected_request_writes_nothing() {
    let (pool, db_name) = create_test_db().await;

    let envelope = harness(&pool, CodingAgent, Dispatch::Development)
        .handle(request(json!({"chartNotes": "x"})))
        .await;
    assert_eq!(envelope.status, 400);

    assert!(agent_runs::get_run(&pool, envelope.run_id).await.unwrap().is_none());
    let counts = agent_runs::count_runs_by_status(&pool, None).await.unwrap();
    assert_eq!(counts.total, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replayed_terminal_write_is_reported() {
    let (pool, db_name) = create_test_db().await;
    let recorder = PgRunRecorder::new(pool.clone());

    let run = NewAgentRun {
        run_id: uuid::Uuid::new_v4(),
        agent_name: "coding".into(),
        agent_version: "1.0.0".into(),
        input_data: json!({}),
        start_time: chrono::Utc::now(),
    };
    recorder.record_started(&run).await.unwrap();
    // A replayed start is a no-op.
    recorder.record_started(&run).await.unwrap();

    let end = run.start_time + chrono::Duration::milliseconds(5);
    recorder
        .record_completed(run.run_id, &json!({"ok": true}), end, 5)
        .await
        .unwrap();
    let err = recorder
        .record_failed(run.run_id, "late failure", end, 5)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not in running state"));

    let stored = agent_runs::get_run(&pool, run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn denial_analysis_is_upserted() {
    let (pool, db_name) = create_test_db().await;

    let reply = json!({
        "category": "coding_error",
        "suggested_action": "recode_and_resubmit",
        "confidence": 0.9,
        "prevention_tips": ["Run claim scrubber"]
    })
    .to_string();
    let dispatch = production(
        &pool,
        ScriptedInference::new().with_reply(reply),
        ScriptedClearinghouse::new(),
    );
    let envelope = harness(&pool, DenialClassifierAgent, dispatch)
        .handle(request(json!({
            "denialData": {
                "claimId": "CLM-40",
                "denialReason": "Invalid procedure code",
                "denialCode": "CO-4",
                "denialDate": "2024-04-02"
            }
        })))
        .await;
    assert!(envelope.success);

    let stored = denials::get_denial(&pool, "CLM-40").await.unwrap().unwrap();
    assert_eq!(stored.denial_category, "coding_error");
    assert_eq!(stored.ai_suggested_action, "recode_and_resubmit");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn appeal_draft_is_stored() {
    let (pool, db_name) = create_test_db().await;

    let dispatch = production(
        &pool,
        ScriptedInference::new().with_reply("Dear Reviewer,\n\nPlease reconsider."),
        ScriptedClearinghouse::new(),
    );
    let envelope = harness(&pool, AppealLetterAgent, dispatch)
        .handle(request(json!({
            "appealData": {"claimId": "CLM-41", "denialReason": "Duplicate claim"}
        })))
        .await;
    assert!(envelope.success);

    let stored = appeals::list_appeals_for_claim(&pool, "CLM-41").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, "draft");
    assert_eq!(stored[0].appeal_letter, "Dear Reviewer,\n\nPlease reconsider.");
    assert_eq!(
        envelope.result.unwrap()["appeal_id"],
        json!(stored[0].appeal_id)
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn claim_submission_updates_claim_row() {
    let (pool, db_name) = create_test_db().await;
    claims::insert_claim(&pool, "CLM-42").await.unwrap();

    let receipt = SubmissionReceipt {
        status: SubmissionStatus::Submitted,
        batch_id: Some("B-42".into()),
        claim_id: Some("C-42".into()),
        tracking_number: Some("T-42".into()),
        validation_status: None,
        submission_id: None,
        validation_errors: Vec::new(),
    };
    let dispatch = production(
        &pool,
        ScriptedInference::new(),
        ScriptedClearinghouse::new().with_receipt(Ok(receipt)),
    );
    let envelope = harness(&pool, SubmitClaimAgent, dispatch)
        .handle(request(json!({
            "claimData": {
                "claimId": "CLM-42",
                "patientId": "P-42",
                "providerId": "PRV-42",
                "serviceDate": "2024-06-01",
                "services": [{"procedureCode": "99213"}]
            }
        })))
        .await;
    assert!(envelope.success);

    let claim = claims::get_claim(&pool, "CLM-42").await.unwrap().unwrap();
    assert_eq!(claim.status, "submitted");
    assert_eq!(claim.claimmd_batch_id.as_deref(), Some("B-42"));
    assert!(claim.claimmd_submission_date.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}
