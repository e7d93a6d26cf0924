//! The capability set every agent implements, and the erased form the
//! harness drives.
//!
//! Concrete agents implement [`AgentContract`] with a typed `Output`
//! shared by both execution paths, so a field present in production
//! output is present in development output by construction. The
//! blanket [`Agent`] impl erases that type to JSON for the harness and
//! the registry.

mod envelope;
mod error;
mod registry;
pub mod request;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use envelope::{ResponseEnvelope, STATUS_FAILED, STATUS_OK, STATUS_REJECTED};
pub use error::{AgentError, ErrorKind, PersistenceWarning, RunPhase};
pub use registry::AgentRegistry;
pub use request::AgentRequest;

use crate::collab::{BusinessStore, Clearinghouse};
use crate::config::ExecutionMode;
use crate::inference::InferenceClient;

/// External collaborators available to production execution.
#[derive(Clone)]
pub struct Collaborators {
    pub inference: Arc<dyn InferenceClient>,
    pub store: Arc<dyn BusinessStore>,
    pub clearinghouse: Arc<dyn Clearinghouse>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("model_id", &self.inference.model_id())
            .finish_non_exhaustive()
    }
}

/// Which execution path a harness dispatches to. Chosen once when the
/// harness is built.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Production(Collaborators),
    Development,
}

impl Dispatch {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Production(_) => ExecutionMode::Production,
            Self::Development => ExecutionMode::Development,
        }
    }
}

/// Model name reported by simulated results.
pub const DEVELOPMENT_MODEL: &str = "development_mock";

/// Version stamped on runs unless an agent overrides it.
pub const DEFAULT_AGENT_VERSION: &str = "1.0.0";

/// One business agent.
///
/// `validate` inspects structure only (presence and basic types), never
/// business plausibility, and has no side effects. `execute_development`
/// is deterministic given the request and touches no collaborator.
#[async_trait]
pub trait AgentContract: Send + Sync {
    /// Result type produced by both execution paths.
    type Output: Serialize + Send;

    fn name(&self) -> &str;

    fn version(&self) -> &str {
        DEFAULT_AGENT_VERSION
    }

    /// `None` when the request is acceptable, otherwise the reason.
    fn validate(&self, request: &AgentRequest) -> Option<String>;

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<Self::Output, AgentError>;

    fn execute_development(&self, request: &AgentRequest) -> Result<Self::Output, AgentError>;
}

/// Object-safe view of an [`AgentContract`] with JSON output.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn validate(&self, request: &AgentRequest) -> Option<String>;

    /// Run the path selected by `dispatch` and serialize its output.
    async fn execute(&self, request: &AgentRequest, dispatch: &Dispatch) -> Result<Value, AgentError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Agent) {}
};

#[async_trait]
impl<T> Agent for T
where
    T: AgentContract,
{
    fn name(&self) -> &str {
        AgentContract::name(self)
    }

    fn version(&self) -> &str {
        AgentContract::version(self)
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        AgentContract::validate(self, request)
    }

    async fn execute(&self, request: &AgentRequest, dispatch: &Dispatch) -> Result<Value, AgentError> {
        let output = match dispatch {
            Dispatch::Production(collaborators) => {
                self.execute_production(request, collaborators).await?
            }
            Dispatch::Development => self.execute_development(request)?,
        };
        serde_json::to_value(output).map_err(|e| {
            AgentError::Unexpected(format!(
                "failed to serialize {} output: {e}",
                AgentContract::name(self)
            ))
        })
    }
}
