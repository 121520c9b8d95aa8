use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::config::Config;

/// A text-generation model: one prompt in, one completion out
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;

    /// Whether a credential is present. An unconfigured generator never makes a network call.
    fn is_configured(&self) -> bool;
}

/// Result of probing the model with a trivial prompt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmStatus {
    pub is_valid: bool,
    pub message: String,
}

/// HTTP client for the LLM gateway
pub struct LlmService {
    gateway_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    http_client: HttpClient,
}

impl LlmService {
    pub fn new(config: &Config) -> Self {
        Self {
            gateway_url: config.llm.gateway_url.clone(),
            api_key: config.llm.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.llm.model.clone(),
            timeout: config.llm_timeout(),
            http_client: HttpClient::new(),
        }
    }

    /// Call the LLM gateway with a single prompt
    async fn call_llm_api(&self, prompt: &str, api_key: &str) -> Result<String, AppError> {
        let request = self
            .http_client
            .post(&self.gateway_url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "max_tokens": 500,
                "temperature": 0.1,
            }));

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to call LLM service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LlmService(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to parse LLM response: {}", e)))?;

        extract_text(&result)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AppError::LlmService("LLM response does not contain any text".to_string()))
    }
}

#[async_trait::async_trait]
impl TextGenerator for LlmService {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AppError::LlmService("LLM service is not configured".to_string()));
        };

        // The request timeout covers the body; this also bounds connection setup
        tokio::time::timeout(self.timeout, self.call_llm_api(prompt, api_key))
            .await
            .map_err(|_| AppError::LlmService(format!("LLM call timed out after {:?}", self.timeout)))?
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Probe a generator with a trivial prompt
pub async fn check_status(generator: &dyn TextGenerator) -> LlmStatus {
    if !generator.is_configured() {
        return LlmStatus {
            is_valid: false,
            message: "LLM API key is not configured. Please add LLM_API_KEY to your environment variables."
                .to_string(),
        };
    }

    match generator.generate("Test").await {
        Ok(_) => LlmStatus {
            is_valid: true,
            message: "LLM API connection successful".to_string(),
        },
        Err(e) => {
            tracing::warn!("LLM API check failed: {}", e);
            LlmStatus {
                is_valid: false,
                message: format!("LLM API check failed: {}", e),
            }
        }
    }
}

/// Pull the completion text out of the common gateway response shapes
fn extract_text(result: &Value) -> Option<&str> {
    result["text"]
        .as_str()
        .or_else(|| result["content"].as_str())
        .or_else(|| result["response"].as_str())
        .or_else(|| result["choices"][0]["message"]["content"].as_str())
        .or_else(|| result["choices"][0]["text"].as_str())
        .or_else(|| result["candidates"][0]["content"]["parts"][0]["text"].as_str())
}

/// Strip markdown code fences a model may wrap around SQL
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```SQL"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}
