pub mod agents;
pub mod collab;
pub mod config;
pub mod contract;
pub mod extract;
pub mod harness;
pub mod inference;
pub mod recorder;

pub use config::{ExecutionMode, HarnessConfig};
pub use contract::{
    Agent, AgentContract, AgentError, AgentRegistry, AgentRequest, Collaborators, Dispatch,
    ErrorKind, ResponseEnvelope,
};
pub use harness::{ExecutionHarness, Invocation};
