//! Agent registry: the named collection of available agents.
//!
//! Transport adapters look agents up by name (a CLI argument or a URL
//! path segment) and build a harness around the result.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Agent;
use crate::agents::{
    AppealLetterAgent, CodingAgent, DenialClassifierAgent, EligibilityAgent, SubmitClaimAgent,
};

/// A collection of registered [`Agent`]s, keyed by name.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in agent.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CodingAgent);
        registry.register(DenialClassifierAgent);
        registry.register(AppealLetterAgent);
        registry.register(EligibilityAgent);
        registry.register(SubmitClaimAgent);
        registry
    }

    /// Register an agent under [`Agent::name`], returning any agent it
    /// replaced.
    pub fn register(&mut self, agent: impl Agent + 'static) -> Option<Arc<dyn Agent>> {
        let name = agent.name().to_string();
        self.agents.insert(name, Arc::new(agent))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// Registered names in alphabetical order.
    pub fn list(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.list())
            .finish()
    }
}
