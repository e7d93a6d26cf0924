use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use rcm_db::models::AgentRun;
use rcm_db::queries::agent_runs;

/// Print the most recent runs as a table, newest first.
pub async fn run_list(pool: &PgPool, agent: Option<&str>, limit: i64) -> Result<()> {
    let runs = agent_runs::list_recent_runs(pool, agent, limit).await?;
    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<18}  {:<9}  {:>8}  STARTED",
        "RUN ID", "AGENT", "STATUS", "MS"
    );
    for run in &runs {
        println!("{}", format_row(run));
    }

    let counts = agent_runs::count_runs_by_status(pool, agent).await?;
    println!();
    println!(
        "{} total: {} completed, {} failed, {} running",
        counts.total, counts.completed, counts.failed, counts.running
    );
    Ok(())
}

/// Print one run as JSON.
pub async fn run_show(pool: &PgPool, run_id: &str) -> Result<()> {
    let id = Uuid::parse_str(run_id).with_context(|| format!("invalid run ID: {run_id}"))?;
    let run = agent_runs::get_run(pool, id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&run).context("failed to serialize run")?
    );
    Ok(())
}

fn format_row(run: &AgentRun) -> String {
    let ms = run
        .execution_time_ms
        .map_or_else(|| "-".to_string(), |ms| ms.to_string());
    format!(
        "{:<36}  {:<18}  {:<9}  {:>8}  {}",
        run.run_id,
        run.agent_name,
        run.status.to_string(),
        ms,
        run.start_time.format("%Y-%m-%d %H:%M:%S")
    )
}
