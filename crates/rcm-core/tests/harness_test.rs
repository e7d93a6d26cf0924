//! Harness state-machine tests against in-memory collaborators.
//!
//! No database is needed: runs are captured by [`MemoryRecorder`] and
//! inference replies are scripted.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use rcm_core::agents::{CodingAgent, DenialClassifierAgent};
use rcm_core::collab::memory::{MemoryBusinessStore, ScriptedClearinghouse};
use rcm_core::contract::{RunPhase, STATUS_FAILED, STATUS_OK, STATUS_REJECTED};
use rcm_core::inference::{InferenceError, ScriptedInference};
use rcm_core::recorder::{NewAgentRun, RunRecorder};
use rcm_core::{
    Agent, AgentContract, AgentError, AgentRequest, Collaborators, Dispatch, ErrorKind,
    ExecutionHarness,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Event {
    Started(NewAgentRun),
    Completed {
        run_id: Uuid,
        output: Value,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    },
    Failed {
        run_id: Uuid,
        error_message: String,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    },
}

/// Recorder that captures every lifecycle write. With `fail_all` set,
/// every write errors after being captured.
#[derive(Debug, Default)]
struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
    fail_all: bool,
}

impl MemoryRecorder {
    fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        if self.fail_all {
            anyhow::bail!("run store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn record_started(&self, run: &NewAgentRun) -> anyhow::Result<()> {
        self.push(Event::Started(run.clone()))
    }

    async fn record_completed(
        &self,
        run_id: Uuid,
        output: &Value,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()> {
        self.push(Event::Completed {
            run_id,
            output: output.clone(),
            end_time,
            execution_time_ms,
        })
    }

    async fn record_failed(
        &self,
        run_id: Uuid,
        error_message: &str,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()> {
        self.push(Event::Failed {
            run_id,
            error_message: error_message.to_string(),
            end_time,
            execution_time_ms,
        })
    }
}

/// Agent whose execution path panics on an out-of-bounds index.
struct PanickingAgent;

#[async_trait]
impl AgentContract for PanickingAgent {
    type Output = Value;

    fn name(&self) -> &str {
        "panicking"
    }

    fn validate(&self, _request: &AgentRequest) -> Option<String> {
        None
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        _collaborators: &Collaborators,
    ) -> Result<Value, AgentError> {
        self.execute_development(request)
    }

    fn execute_development(&self, _request: &AgentRequest) -> Result<Value, AgentError> {
        let codes: Vec<Value> = Vec::new();
        Ok(codes[0].clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn request(value: Value) -> AgentRequest {
    AgentRequest::try_from(value).unwrap()
}

fn coding_request() -> AgentRequest {
    request(json!({
        "patientData": {"age": 45, "gender": "F"},
        "encounterData": {"type": "office_visit"},
        "chartNotes": "Follow-up for hypertension, stable on lisinopril."
    }))
}

fn production(inference: ScriptedInference) -> Dispatch {
    Dispatch::Production(Collaborators {
        inference: Arc::new(inference),
        store: Arc::new(MemoryBusinessStore::new()),
        clearinghouse: Arc::new(ScriptedClearinghouse::new()),
    })
}

fn harness(
    agent: impl Agent + 'static,
    recorder: &Arc<MemoryRecorder>,
    dispatch: Dispatch,
) -> ExecutionHarness {
    let recorder: Arc<dyn RunRecorder> = recorder.clone();
    ExecutionHarness::new(Arc::new(agent), recorder, dispatch)
}

fn assert_timing_consistent(start: &NewAgentRun, end_time: DateTime<Utc>, ms: u64) {
    let elapsed = end_time - start.start_time;
    assert_eq!(elapsed.num_milliseconds(), i64::try_from(ms).unwrap());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_request_creates_no_run() {
    let recorder = Arc::new(MemoryRecorder::default());
    let harness = harness(CodingAgent, &recorder, Dispatch::Development);

    let invocation = harness
        .run(request(json!({"encounterData": {"a": 1}, "chartNotes": "x"})))
        .await;

    let envelope = invocation.envelope;
    assert!(!envelope.success);
    assert_eq!(envelope.status, STATUS_REJECTED);
    assert_eq!(
        envelope.error.as_deref(),
        Some("Missing required field: patientData")
    );
    assert_eq!(envelope.agent_name, "coding");
    assert!(envelope.result.is_none());
    assert_eq!(invocation.failure, Some(ErrorKind::Validation));
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn development_success_records_start_and_completion() {
    let recorder = Arc::new(MemoryRecorder::default());
    let harness = harness(CodingAgent, &recorder, Dispatch::Development);

    let invocation = harness.run(coding_request()).await;
    let envelope = invocation.envelope;

    assert!(envelope.success);
    assert_eq!(envelope.status, STATUS_OK);
    let result = envelope.result.clone().unwrap();
    assert_eq!(result["development_mode"], true);
    assert_eq!(result["cpt_codes"][0]["code"], "99213");
    assert!(invocation.warnings.is_empty());

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    let Event::Started(start) = &events[0] else {
        panic!("first event should be a start, got {:?}", events[0]);
    };
    assert_eq!(start.run_id, envelope.run_id);
    assert_eq!(start.agent_name, "coding");
    assert_eq!(start.agent_version, "1.0.0");
    assert_eq!(start.input_data, coding_request().to_value());

    let Event::Completed {
        run_id,
        output,
        end_time,
        execution_time_ms,
    } = &events[1]
    else {
        panic!("second event should be a completion, got {:?}", events[1]);
    };
    assert_eq!(*run_id, envelope.run_id);
    assert_eq!(*output, result);
    assert_eq!(*execution_time_ms, envelope.execution_time_ms);
    assert_timing_consistent(start, *end_time, *execution_time_ms);
}

#[tokio::test]
async fn production_timeout_fails_with_generic_message() {
    let recorder = Arc::new(MemoryRecorder::default());
    let inference = ScriptedInference::new().with_error(InferenceError::Timeout);
    let harness = harness(CodingAgent, &recorder, production(inference));

    let invocation = harness.run(coding_request()).await;
    let envelope = invocation.envelope;

    assert!(!envelope.success);
    assert_eq!(envelope.status, STATUS_FAILED);
    assert_eq!(envelope.error.as_deref(), Some("coding execution failed"));
    assert!(envelope.result.is_none());
    assert_eq!(invocation.failure, Some(ErrorKind::Inference));

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    let Event::Started(start) = &events[0] else {
        panic!("expected start event");
    };
    let Event::Failed {
        run_id,
        error_message,
        end_time,
        execution_time_ms,
    } = &events[1]
    else {
        panic!("expected failure event, got {:?}", events[1]);
    };
    assert_eq!(*run_id, envelope.run_id);
    // The stored message keeps the underlying cause.
    assert!(error_message.contains("timed out"), "{error_message}");
    assert_timing_consistent(start, *end_time, *execution_time_ms);
}

#[tokio::test]
async fn unusable_model_output_is_not_a_failure() {
    let recorder = Arc::new(MemoryRecorder::default());
    let inference = ScriptedInference::new().with_reply("I cannot determine codes.");
    let harness = harness(CodingAgent, &recorder, production(inference));

    let envelope = harness.handle(coding_request()).await;

    assert!(envelope.success);
    let result = envelope.result.unwrap();
    assert_eq!(result["requires_manual_review"], true);
    assert_eq!(result["development_mode"], false);
}

#[tokio::test]
async fn each_invocation_gets_a_distinct_run() {
    let recorder = Arc::new(MemoryRecorder::default());
    let harness = harness(CodingAgent, &recorder, Dispatch::Development);

    let first = harness.handle(coding_request()).await;
    let second = harness.handle(coding_request()).await;

    assert_ne!(first.run_id, second.run_id);
    let started: Vec<Uuid> = recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Started(run) => Some(run.run_id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![first.run_id, second.run_id]);
}

#[tokio::test]
async fn recorder_failures_do_not_change_the_outcome() {
    let recorder = Arc::new(MemoryRecorder::failing());
    let harness = harness(DenialClassifierAgent, &recorder, Dispatch::Development);

    let invocation = harness
        .run(request(json!({
            "denialData": {"claimId": "CLM-1", "denialReason": "Invalid CPT code"}
        })))
        .await;

    assert!(invocation.envelope.success);
    assert_eq!(invocation.envelope.status, STATUS_OK);
    let phases: Vec<RunPhase> = invocation.warnings.iter().map(|w| w.phase).collect();
    assert_eq!(phases, vec![RunPhase::Started, RunPhase::Completed]);
    for warning in &invocation.warnings {
        assert_eq!(warning.run_id, invocation.envelope.run_id);
        assert_eq!(warning.kind(), ErrorKind::Persistence);
        assert!(warning.message.contains("run store unavailable"));
    }
}

#[tokio::test]
async fn recorder_failure_on_failed_run_keeps_generic_error() {
    let recorder = Arc::new(MemoryRecorder::failing());
    let inference = ScriptedInference::new().with_error(InferenceError::EmptyResponse);
    let harness = harness(CodingAgent, &recorder, production(inference));

    let invocation = harness.run(coding_request()).await;

    assert_eq!(invocation.envelope.status, STATUS_FAILED);
    assert_eq!(
        invocation.envelope.error.as_deref(),
        Some("coding execution failed")
    );
    let phases: Vec<RunPhase> = invocation.warnings.iter().map(|w| w.phase).collect();
    assert_eq!(phases, vec![RunPhase::Started, RunPhase::Failed]);
}

#[tokio::test]
async fn production_prompt_uses_agent_parameters() {
    let recorder = Arc::new(MemoryRecorder::default());
    let inference = ScriptedInference::new().with_reply(
        r#"{"cpt_codes": [{"code": "99214", "description": "Office visit", "confidence": 0.9}],
            "icd_codes": [{"code": "I10", "description": "Hypertension", "confidence": 0.95}]}"#,
    );
    let harness = harness(CodingAgent, &recorder, production(inference.clone()));

    let envelope = harness.handle(coding_request()).await;

    assert!(envelope.success);
    let captured = inference.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].max_tokens, 1000);
    assert!((captured[0].temperature - 0.1).abs() < f32::EPSILON);
    assert!(captured[0].prompt.contains("lisinopril"));
    let result = envelope.result.unwrap();
    assert_eq!(result["model_used"], "scripted-model");
    assert_eq!(result["icd_codes"][0]["code"], "I10");
}

#[tokio::test]
async fn agent_panic_ends_run_as_failed() {
    let recorder = Arc::new(MemoryRecorder::default());
    let harness = harness(PanickingAgent, &recorder, Dispatch::Development);

    // Run on a separate task so an escaping panic would surface as a JoinError.
    let invocation = tokio::spawn(async move { harness.run(request(json!({}))).await })
        .await
        .expect("panic escaped the harness");

    let envelope = invocation.envelope;
    assert!(!envelope.success);
    assert_eq!(envelope.status, STATUS_FAILED);
    assert_eq!(envelope.error.as_deref(), Some("panicking execution failed"));
    assert_eq!(invocation.failure, Some(ErrorKind::Unexpected));
    assert!(invocation.warnings.is_empty());

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    let Event::Started(start) = &events[0] else {
        panic!("first event should be a start, got {:?}", events[0]);
    };
    let Event::Failed {
        run_id,
        error_message,
        end_time,
        execution_time_ms,
    } = &events[1]
    else {
        panic!("second event should be a failure, got {:?}", events[1]);
    };
    assert_eq!(*run_id, envelope.run_id);
    assert!(error_message.contains("agent panicked"), "{error_message}");
    assert!(error_message.contains("index out of bounds"), "{error_message}");
    assert_timing_consistent(start, *end_time, *execution_time_ms);
}
