use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::extract::ExtractionError;
use crate::inference::InferenceError;

/// Failure classes an invocation can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected before any run started.
    Validation,
    /// The inference service or its transport failed.
    Inference,
    /// Model output could not be turned into a result.
    Extraction,
    /// A lifecycle write failed. Never changes the outcome.
    Persistence,
    /// Anything else, including collaborator failures.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Inference => "inference",
            Self::Extraction => "extraction",
            Self::Persistence => "persistence",
            Self::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

/// Error returned by an agent's execution path.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// A downstream business collaborator (clearinghouse, payer) failed.
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Inference(_) => ErrorKind::Inference,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Collaborator(_) | Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Lifecycle phase a recorder write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "start",
            Self::Completed => "completion",
            Self::Failed => "failure",
        };
        f.write_str(s)
    }
}

/// A lifecycle write that failed and was swallowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to record {phase} of run {run_id}: {message}")]
pub struct PersistenceWarning {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub message: String,
}

impl PersistenceWarning {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}
