use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{InferenceClient, InferenceError};

/// One prompt captured by [`ScriptedInference`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPrompt {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// An inference client that replays queued replies.
///
/// Each call to `generate` pops the next queued reply or error. An empty
/// queue yields [`InferenceError::EmptyResponse`]. Clones share the same
/// queue and capture log.
#[derive(Debug, Clone)]
pub struct ScriptedInference {
    model_id: String,
    replies: Arc<Mutex<VecDeque<Result<String, InferenceError>>>>,
    captured: Arc<Mutex<Vec<CapturedPrompt>>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self {
            model_id: "scripted-model".to_string(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.lock_replies().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: InferenceError) -> Self {
        self.lock_replies().push_back(Err(error));
        self
    }

    /// Every prompt received so far, oldest first.
    pub fn captured(&self) -> Vec<CapturedPrompt> {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of replies still queued.
    pub fn remaining(&self) -> usize {
        self.lock_replies().len()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, InferenceError>>> {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScriptedInference {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError> {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(CapturedPrompt {
                prompt: prompt.to_string(),
                max_tokens,
                temperature,
            });

        self.lock_replies()
            .pop_front()
            .unwrap_or(Err(InferenceError::EmptyResponse))
    }
}
