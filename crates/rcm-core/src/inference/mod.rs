//! Inference client abstraction.
//!
//! Every production agent shares one external call: send a prompt to a
//! text-generation model and get raw text back. The client is a conduit
//! only; prompt construction and response interpretation belong to the
//! agents.

mod http;
mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpInferenceClient;
pub use scripted::ScriptedInference;

/// Errors surfaced by an [`InferenceClient`].
///
/// A client never returns partially decoded or empty text silently; each
/// of these is a distinguishable inference failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// The call exceeded the configured request timeout.
    #[error("inference request timed out")]
    Timeout,

    /// Connection, DNS, or TLS failure.
    #[error("inference transport error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("inference service returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The service answered successfully but produced no text.
    #[error("inference service returned an empty response")]
    EmptyResponse,

    /// The response body did not have the expected shape.
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),

    /// No endpoint was configured for production inference.
    #[error("inference endpoint is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Sends one prompt to a text-generation model.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Identifier of the model behind this client, reported by agents as
    /// `model_used`.
    fn model_id(&self) -> &str;

    /// Generate text for `prompt`. `temperature` is expected in `[0, 1]`.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn InferenceClient) {}
};
