//! The execution harness: one invocation from request to envelope.
//!
//! States: `Idle -> Validating -> (Rejected | Dispatching) ->
//! (Succeeded | Failed)`.
//!
//! - A rejected request returns a `success=false` envelope carrying the
//!   validation message and creates no run.
//! - An accepted request gets a fresh `run_id`, is recorded as `running`,
//!   and is dispatched to the path fixed when the harness was built.
//! - The terminal write records the output or the underlying error text.
//!   The caller only ever sees a generic failure message.
//!
//! A panic inside an agent is caught here and treated as an unexpected
//! failure, so the run still gets its terminal write.
//!
//! Recorder failures are collected as [`PersistenceWarning`]s and logged;
//! they never change the envelope.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExecutionMode;
use crate::contract::{
    Agent, AgentError, AgentRequest, Dispatch, ErrorKind, PersistenceWarning, ResponseEnvelope, RunPhase,
};
use crate::recorder::{NewAgentRun, RunRecorder};

/// Everything one invocation produced.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub envelope: ResponseEnvelope,
    /// Lifecycle writes that failed and were swallowed.
    pub warnings: Vec<PersistenceWarning>,
    /// Failure class, when the invocation did not succeed.
    pub failure: Option<ErrorKind>,
}

/// Drives one agent through validation, dispatch, and recording.
pub struct ExecutionHarness {
    agent: Arc<dyn Agent>,
    recorder: Arc<dyn RunRecorder>,
    dispatch: Dispatch,
}

impl std::fmt::Debug for ExecutionHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHarness")
            .field("agent", &self.agent.name())
            .field("mode", &self.dispatch.mode())
            .finish()
    }
}

impl ExecutionHarness {
    pub fn new(agent: Arc<dyn Agent>, recorder: Arc<dyn RunRecorder>, dispatch: Dispatch) -> Self {
        Self {
            agent,
            recorder,
            dispatch,
        }
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.dispatch.mode()
    }

    /// Handle one request and return only the envelope.
    pub async fn handle(&self, request: AgentRequest) -> ResponseEnvelope {
        self.run(request).await.envelope
    }

    /// Handle one request, returning the envelope together with any
    /// swallowed persistence warnings.
    pub async fn run(&self, request: AgentRequest) -> Invocation {
        let clock = Instant::now();
        let start_time = Utc::now();
        let run_id = Uuid::new_v4();
        let agent = self.agent.name();
        let mode = self.mode();

        if let Some(message) = self.agent.validate(&request) {
            info!(run_id = %run_id, agent, mode = %mode, reason = %message, "request rejected");
            let elapsed = elapsed_ms(clock);
            return Invocation {
                envelope: ResponseEnvelope::rejected(run_id, agent, elapsed, message),
                warnings: Vec::new(),
                failure: Some(ErrorKind::Validation),
            };
        }

        let mut warnings = Vec::new();
        let new_run = NewAgentRun {
            run_id,
            agent_name: agent.to_string(),
            agent_version: self.agent.version().to_string(),
            input_data: request.to_value(),
            start_time,
        };
        info!(run_id = %run_id, agent, mode = %mode, "agent run started");
        if let Err(e) = self.recorder.record_started(&new_run).await {
            warnings.push(self.warn(run_id, RunPhase::Started, &e));
        }

        let outcome = AssertUnwindSafe(self.agent.execute(&request, &self.dispatch))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(AgentError::Unexpected(format!(
                    "agent panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let execution_time_ms = elapsed_ms(clock);
        let end_time = end_time(start_time, execution_time_ms);

        match outcome {
            Ok(result) => {
                info!(run_id = %run_id, agent, mode = %mode, execution_time_ms, "agent run completed");
                if let Err(e) = self
                    .recorder
                    .record_completed(run_id, &result, end_time, execution_time_ms)
                    .await
                {
                    warnings.push(self.warn(run_id, RunPhase::Completed, &e));
                }
                Invocation {
                    envelope: ResponseEnvelope::succeeded(run_id, agent, execution_time_ms, result),
                    warnings,
                    failure: None,
                }
            }
            Err(err) => {
                let kind = err.kind();
                error!(
                    run_id = %run_id,
                    agent,
                    mode = %mode,
                    execution_time_ms,
                    kind = %kind,
                    error = %err,
                    "agent run failed"
                );
                if let Err(e) = self
                    .recorder
                    .record_failed(run_id, &err.to_string(), end_time, execution_time_ms)
                    .await
                {
                    warnings.push(self.warn(run_id, RunPhase::Failed, &e));
                }
                Invocation {
                    envelope: ResponseEnvelope::failed(run_id, agent, execution_time_ms),
                    warnings,
                    failure: Some(kind),
                }
            }
        }
    }

    fn warn(&self, run_id: Uuid, phase: RunPhase, err: &anyhow::Error) -> PersistenceWarning {
        let warning = PersistenceWarning {
            run_id,
            phase,
            message: format!("{err:#}"),
        };
        warn!(run_id = %run_id, agent = self.agent.name(), phase = %phase, error = %warning.message, "{warning}");
        warning
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// End time derived from the monotonic elapsed time, so the stored
/// `end_time - start_time` equals `execution_time_ms` exactly.
fn end_time(start_time: DateTime<Utc>, execution_time_ms: u64) -> DateTime<Utc> {
    i64::try_from(execution_time_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|elapsed| start_time.checked_add_signed(elapsed))
        .unwrap_or(start_time)
}
