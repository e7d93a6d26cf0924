use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{InferenceClient, InferenceError};
use crate::config::HarnessConfig;

/// Nucleus sampling value sent with every request.
const TOP_P: f32 = 0.9;

/// Client for a model-invoke HTTP endpoint.
///
/// Posts to `{endpoint}/model/{model_id}/invoke` with the text-generation
/// body and reads `results[0].outputText` from the reply. The request
/// timeout from [`HarnessConfig`] is applied to every call.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: Option<String>,
}

impl HttpInferenceClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        config: &HarnessConfig,
    ) -> Result<Self, InferenceError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(InferenceError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InferenceError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model_id: config.inference_model_id().to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint, self.model_id)
    }

    /// Build the JSON request body. Temperature is clamped to `[0, 1]`.
    pub fn build_request_body(prompt: &str, max_tokens: u32, temperature: f32) -> serde_json::Value {
        let temperature = if temperature.is_nan() {
            0.0
        } else {
            temperature.clamp(0.0, 1.0)
        };
        json!({
            "inputText": prompt,
            "textGenerationConfig": {
                "maxTokenCount": max_tokens,
                "temperature": temperature,
                "topP": TOP_P,
                "stopSequences": [],
            }
        })
    }
}

#[derive(Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    results: Vec<InvokeResult>,
}

#[derive(Deserialize)]
struct InvokeResult {
    #[serde(rename = "outputText", default)]
    output_text: Option<String>,
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError> {
        let body = Self::build_request_body(prompt, max_tokens, temperature);
        let url = self.invoke_url();
        debug!(model = %self.model_id, max_tokens, "invoking inference endpoint");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: InvokeResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .results
            .into_iter()
            .next()
            .and_then(|r| r.output_text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(text)
    }
}
