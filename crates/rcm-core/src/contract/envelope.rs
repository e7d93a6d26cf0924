use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status code class for a validation rejection.
pub const STATUS_REJECTED: u16 = 400;
/// Status code class for an execution failure.
pub const STATUS_FAILED: u16 = 500;
/// Status code class for a successful run.
pub const STATUS_OK: u16 = 200;

/// The uniform response every invocation returns.
///
/// Exactly one of `result` and `error` is set, matching `success`. The
/// constructors are the only way the harness builds one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub run_id: Uuid,
    pub agent_name: String,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: u16,
}

impl ResponseEnvelope {
    pub fn succeeded(run_id: Uuid, agent_name: &str, execution_time_ms: u64, result: Value) -> Self {
        Self {
            success: true,
            run_id,
            agent_name: agent_name.to_string(),
            execution_time_ms,
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
            status: STATUS_OK,
        }
    }

    /// A validation rejection. `run_id` is for log correlation only; no
    /// run exists under it.
    pub fn rejected(
        run_id: Uuid,
        agent_name: &str,
        execution_time_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::failure(run_id, agent_name, execution_time_ms, message.into(), STATUS_REJECTED)
    }

    /// An execution failure. The caller sees a generic message; the cause
    /// lives in the run record.
    pub fn failed(run_id: Uuid, agent_name: &str, execution_time_ms: u64) -> Self {
        Self::failure(
            run_id,
            agent_name,
            execution_time_ms,
            format!("{agent_name} execution failed"),
            STATUS_FAILED,
        )
    }

    fn failure(
        run_id: Uuid,
        agent_name: &str,
        execution_time_ms: u64,
        message: String,
        status: u16,
    ) -> Self {
        Self {
            success: false,
            run_id,
            agent_name: agent_name.to_string(),
            execution_time_ms,
            result: None,
            error: Some(message),
            timestamp: Utc::now(),
            status,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.status == STATUS_REJECTED
    }
}
