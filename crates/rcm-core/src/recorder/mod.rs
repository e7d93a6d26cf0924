//! Durable and log-only recording of run lifecycle events.
//!
//! The harness calls a [`RunRecorder`] exactly once per phase transition:
//! once when a validated run starts and once when it reaches a terminal
//! state. Recorders report their own failures as errors; the harness
//! turns those into [`crate::contract::PersistenceWarning`]s and carries
//! on, so a recorder can never change the outcome of a run.

mod log;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

pub use self::log::LogRunRecorder;
pub use self::postgres::PgRunRecorder;
pub use rcm_db::queries::agent_runs::NewAgentRun;

/// Persists the three lifecycle events of a run.
///
/// Every operation is idempotent on `run_id`.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Record a run entering `running`.
    async fn record_started(&self, run: &NewAgentRun) -> anyhow::Result<()>;

    /// Record a run reaching `completed` with its output.
    async fn record_completed(
        &self,
        run_id: Uuid,
        output: &Value,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()>;

    /// Record a run reaching `failed` with the underlying error text.
    async fn record_failed(
        &self,
        run_id: Uuid,
        error_message: &str,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn RunRecorder) {}
};
