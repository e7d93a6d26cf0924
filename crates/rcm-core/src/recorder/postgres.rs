use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use rcm_db::queries::agent_runs::{self, RunOutcome};

use super::{NewAgentRun, RunRecorder};

/// Recorder backed by the `agent_runs` table.
#[derive(Debug, Clone)]
pub struct PgRunRecorder {
    pool: PgPool,
}

impl PgRunRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finish(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> Result<()> {
        let ms = i64::try_from(execution_time_ms)
            .with_context(|| format!("execution time {execution_time_ms}ms out of range"))?;
        let rows = agent_runs::finish_run(&self.pool, run_id, &outcome, end_time, ms).await?;
        if rows == 0 {
            // Either the start was never persisted or the run is already
            // terminal. Both leave the stored record incomplete.
            bail!(
                "run {run_id} was not in running state; {} not recorded",
                outcome.status()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for PgRunRecorder {
    async fn record_started(&self, run: &NewAgentRun) -> Result<()> {
        let inserted = agent_runs::insert_run_started(&self.pool, run).await?;
        if !inserted {
            debug!(run_id = %run.run_id, "run start already recorded");
        }
        Ok(())
    }

    async fn record_completed(
        &self,
        run_id: Uuid,
        output: &Value,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> Result<()> {
        let outcome = RunOutcome::Completed {
            output_data: output.clone(),
        };
        self.finish(run_id, outcome, end_time, execution_time_ms)
            .await
    }

    async fn record_failed(
        &self,
        run_id: Uuid,
        error_message: &str,
        end_time: DateTime<Utc>,
        execution_time_ms: u64,
    ) -> Result<()> {
        let outcome = RunOutcome::Failed {
            error_message: error_message.to_string(),
        };
        self.finish(run_id, outcome, end_time, execution_time_ms)
            .await
    }
}
