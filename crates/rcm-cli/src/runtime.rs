//! Wiring from resolved configuration to runnable harnesses.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use rcm_core::collab::{HttpClearinghouse, PgBusinessStore};
use rcm_core::inference::HttpInferenceClient;
use rcm_core::recorder::{LogRunRecorder, PgRunRecorder, RunRecorder};
use rcm_core::{AgentRegistry, Collaborators, Dispatch, ExecutionHarness, ExecutionMode};
use rcm_db::pool;

use crate::config::{INFERENCE_ENDPOINT_ENV, RcmConfig, RecorderKind};

/// Everything needed to build a harness for any registered agent.
///
/// The dispatch path is fixed here, so every harness handed out shares
/// the same mode.
pub struct Runtime {
    registry: AgentRegistry,
    recorder: Arc<dyn RunRecorder>,
    dispatch: Dispatch,
}

impl Runtime {
    pub fn new(registry: AgentRegistry, recorder: Arc<dyn RunRecorder>, dispatch: Dispatch) -> Self {
        Self {
            registry,
            recorder,
            dispatch,
        }
    }

    /// Build the standard runtime from configuration.
    ///
    /// Connects to the database only when the durable recorder or the
    /// production business store needs it; the pool is returned so the
    /// caller can close it.
    pub async fn from_config(config: &RcmConfig) -> Result<(Self, Option<PgPool>)> {
        let pool = if config.needs_database() {
            Some(pool::create_pool(&config.db_config).await?)
        } else {
            None
        };

        let recorder = select_recorder(config.recorder, pool.as_ref())?;
        let dispatch = match config.mode() {
            ExecutionMode::Development => Dispatch::Development,
            ExecutionMode::Production => {
                let pool = pool
                    .as_ref()
                    .context("production mode needs a database connection")?;
                Dispatch::Production(collaborators(config, pool.clone())?)
            }
        };

        info!(
            mode = %config.mode(),
            recorder = %config.recorder,
            model = %config.harness.inference_model_id(),
            "runtime configured"
        );
        Ok((Self::new(AgentRegistry::standard(), recorder, dispatch), pool))
    }

    pub fn mode(&self) -> ExecutionMode {
        self.dispatch.mode()
    }

    pub fn agents(&self) -> Vec<&str> {
        self.registry.list()
    }

    /// A harness for the named agent, or `None` if it is not registered.
    pub fn harness(&self, agent_name: &str) -> Option<ExecutionHarness> {
        let agent = self.registry.get(agent_name)?;
        Some(ExecutionHarness::new(
            agent,
            Arc::clone(&self.recorder),
            self.dispatch.clone(),
        ))
    }
}

/// The configured recorder. The durable recorder without a pool is a
/// wiring error, never a silent switch to logging.
fn select_recorder(kind: RecorderKind, pool: Option<&PgPool>) -> Result<Arc<dyn RunRecorder>> {
    match kind {
        RecorderKind::Log => Ok(Arc::new(LogRunRecorder)),
        RecorderKind::Postgres => {
            let pool = pool.context("the postgres recorder needs a database connection")?;
            Ok(Arc::new(PgRunRecorder::new(pool.clone())))
        }
    }
}

fn collaborators(config: &RcmConfig, pool: PgPool) -> Result<Collaborators> {
    let endpoint = config.inference_endpoint.as_deref().with_context(|| {
        format!("production mode needs an inference endpoint; set {INFERENCE_ENDPOINT_ENV}")
    })?;
    let inference =
        HttpInferenceClient::new(endpoint, config.inference_api_key.clone(), &config.harness)
            .context("failed to build inference client")?;
    let clearinghouse = HttpClearinghouse::new(
        &config.clearinghouse_url,
        config.clearinghouse_key.clone(),
        &config.harness,
    )
    .context("failed to build clearinghouse client")?;

    Ok(Collaborators {
        inference: Arc::new(inference),
        store: Arc::new(PgBusinessStore::new(pool)),
        clearinghouse: Arc::new(clearinghouse),
    })
}
