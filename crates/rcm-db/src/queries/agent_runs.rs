//! Database query functions for the `agent_runs` table.
//!
//! The harness writes each run exactly twice: one insert when the run
//! starts and one terminal update. Both writes are idempotent on
//! `run_id`: a replayed insert does nothing, and a terminal update only
//! touches rows that are still `running`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AgentRun, RunStatus};

/// Parameters for inserting a run in the `running` state.
#[derive(Debug, Clone)]
pub struct NewAgentRun {
    pub run_id: Uuid,
    pub agent_name: String,
    pub agent_version: String,
    pub input_data: Value,
    pub start_time: DateTime<Utc>,
}

/// Terminal outcome written by [`finish_run`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { output_data: Value },
    Failed { error_message: String },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed { .. } => RunStatus::Completed,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// Insert a new run with status `running`.
///
/// Returns `true` if a row was inserted, `false` if a run with the same
/// `run_id` already existed.
pub async fn insert_run_started(pool: &PgPool, new: &NewAgentRun) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO agent_runs \
             (run_id, agent_name, agent_version, input_data, status, start_time, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'running', $5, $5, $5) \
         ON CONFLICT (run_id) DO NOTHING",
    )
    .bind(new.run_id)
    .bind(&new.agent_name)
    .bind(&new.agent_version)
    .bind(&new.input_data)
    .bind(new.start_time)
    .execute(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert run {} for agent {}",
            new.run_id, new.agent_name
        )
    })?;

    Ok(result.rows_affected() == 1)
}

/// Write the terminal state of a run.
///
/// Only applies to runs still in `running`. Returns the number of rows
/// updated: `1` on the first terminal write, `0` if the run does not
/// exist or is already terminal.
pub async fn finish_run(
    pool: &PgPool,
    run_id: Uuid,
    outcome: &RunOutcome,
    end_time: DateTime<Utc>,
    execution_time_ms: i64,
) -> Result<u64> {
    let (output_data, error_message) = match outcome {
        RunOutcome::Completed { output_data } => (Some(output_data), None),
        RunOutcome::Failed { error_message } => (None, Some(error_message.as_str())),
    };

    let result = sqlx::query(
        "UPDATE agent_runs \
         SET status = $2, output_data = $3, error_message = $4, \
             end_time = $5, execution_time_ms = $6, updated_at = $5 \
         WHERE run_id = $1 AND status = 'running'",
    )
    .bind(run_id)
    .bind(outcome.status())
    .bind(output_data)
    .bind(error_message)
    .bind(end_time)
    .bind(execution_time_ms)
    .execute(pool)
    .await
    .with_context(|| format!("failed to mark run {run_id} as {}", outcome.status()))?;

    Ok(result.rows_affected())
}

/// Fetch a run by its ID.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Option<AgentRun>> {
    let run = sqlx::query_as::<_, AgentRun>("SELECT * FROM agent_runs WHERE run_id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch run {run_id}"))?;

    Ok(run)
}

/// List the most recent runs (newest first), optionally for one agent.
pub async fn list_recent_runs(
    pool: &PgPool,
    agent_name: Option<&str>,
    limit: i64,
) -> Result<Vec<AgentRun>> {
    let runs = if let Some(agent_name) = agent_name {
        sqlx::query_as::<_, AgentRun>(
            "SELECT * FROM agent_runs \
             WHERE agent_name = $1 \
             ORDER BY start_time DESC \
             LIMIT $2",
        )
        .bind(agent_name)
        .bind(limit)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, AgentRun>(
            "SELECT * FROM agent_runs \
             ORDER BY start_time DESC \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
    .context("failed to list recent runs")?;

    Ok(runs)
}

/// Run counts grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStatusCounts {
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

/// Count runs by status, optionally for one agent.
pub async fn count_runs_by_status(
    pool: &PgPool,
    agent_name: Option<&str>,
) -> Result<RunStatusCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) \
         FROM agent_runs \
         WHERE $1::text IS NULL OR agent_name = $1 \
         GROUP BY status",
    )
    .bind(agent_name)
    .fetch_all(pool)
    .await
    .context("failed to count runs by status")?;

    let mut counts = RunStatusCounts::default();
    for (status, count) in &rows {
        match status.as_str() {
            "running" => counts.running = *count,
            "completed" => counts.completed = *count,
            "failed" => counts.failed = *count,
            _ => {}
        }
        counts.total += count;
    }
    Ok(counts)
}
