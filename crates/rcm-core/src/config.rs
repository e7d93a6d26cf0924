//! Harness configuration.
//!
//! A [`HarnessConfig`] is resolved once at startup and handed to the
//! harness and its collaborators. The execution mode it carries is fixed
//! for the lifetime of every harness built from it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default inference model identifier.
pub const DEFAULT_MODEL_ID: &str = "amazon.nova-pro-v1:0";

/// Default budget for one inference or clearinghouse call.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Whether agents call real collaborators or return simulated results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Production,
    Development,
}

impl ExecutionMode {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Production => "production",
            Self::Development => "development",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Errors raised while building a [`HarnessConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid execution mode {0:?} (expected \"production\" or \"development\")")]
    InvalidMode(String),

    #[error("request_timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("inference model id must not be empty")]
    EmptyModelId,
}

/// Settings shared by the harness, the inference client, and the
/// clearinghouse client.
///
/// Only constructed through [`HarnessConfig::new`], which deserialization
/// also goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHarnessConfig")]
pub struct HarnessConfig {
    mode: ExecutionMode,
    inference_model_id: String,
    request_timeout_ms: u64,
}

#[derive(Deserialize)]
struct RawHarnessConfig {
    mode: ExecutionMode,
    inference_model_id: String,
    request_timeout_ms: u64,
}

impl TryFrom<RawHarnessConfig> for HarnessConfig {
    type Error = ConfigError;

    fn try_from(raw: RawHarnessConfig) -> Result<Self, Self::Error> {
        Self::new(raw.mode, raw.inference_model_id, raw.request_timeout_ms)
    }
}

impl HarnessConfig {
    /// Build a validated config. Every outbound call must be bounded, so a
    /// zero timeout is rejected.
    pub fn new(
        mode: ExecutionMode,
        inference_model_id: impl Into<String>,
        request_timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let inference_model_id = inference_model_id.into();
        if inference_model_id.trim().is_empty() {
            return Err(ConfigError::EmptyModelId);
        }
        if request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            mode,
            inference_model_id,
            request_timeout_ms,
        })
    }

    /// A development config with default model and timeout.
    pub fn development() -> Self {
        Self {
            mode: ExecutionMode::Development,
            inference_model_id: DEFAULT_MODEL_ID.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn inference_model_id(&self) -> &str {
        &self.inference_model_id
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
