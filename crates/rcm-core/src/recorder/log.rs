use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{NewAgentRun, RunRecorder};

/// Recorder that only emits tracing events.
///
/// Each phase produces one `info` event carrying the fields the durable
/// recorder would have written. It never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRunRecorder;

#[async_trait]
impl RunRecorder for LogRunRecorder {
    async fn record_started(&self, run: &NewAgentRun) -> anyhow::Result<()> {
        info!(
            run_id = %run.run_id,
            agent = %run.agent_name,
            agent_version = %run.agent_version,
            start_time = %run.start_time.to_rfc3339(),
            input = %run.input_data,
            "agent run started"
        );
        Ok(())
    }

    async fn record_completed(
        &self,
        run_id: Uuid,
        output: &Value,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()> {
        info!(
            run_id = %run_id,
            end_time = %end_time.to_rfc3339(),
            execution_time_ms,
            output = %output,
            "agent run completed"
        );
        Ok(())
    }

    async fn record_failed(
        &self,
        run_id: Uuid,
        error_message: &str,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> anyhow::Result<()> {
        info!(
            run_id = %run_id,
            end_time = %end_time.to_rfc3339(),
            execution_time_ms,
            error = %error_message,
            "agent run failed"
        );
        Ok(())
    }
}
