//! LLM completion capability and the shared structured-output wrapper.
//!
//! Every agent stage talks to the model through [`LlmClient`], which owns
//! retry, backoff, schema validation, and the per-call timeout. The client
//! is agent-agnostic: agents differ only in prompts and response types.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the completion capability.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    RequestFailed(String),

    #[error("api key not configured for {0}")]
    MissingApiKey(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("response violates schema: {0}")]
    SchemaViolation(String),

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

/// One structured completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt establishing the agent role.
    pub system: String,
    /// User prompt with question, context, and history.
    pub prompt: String,
    /// JSON schema the response must match.
    pub schema: Value,
    /// Sampling temperature.
    pub temperature: f64,
}

/// External LLM completion capability.
///
/// Must support structured output: the returned value is parsed against the
/// request's schema, and malformed output is a retryable failure.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LlmError>;
}

/// Instruction appended on retry attempts when the first response failed to
/// parse against the schema.
const STRICT_FORMAT_INSTRUCTION: &str = "\n\nIMPORTANT: Your previous response did not match the \
     required JSON schema. Respond with ONLY a single JSON object matching the schema exactly. \
     No prose, no markdown fences, no trailing commentary.";

/// Retry-with-backoff wrapper around a [`CompletionProvider`].
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn CompletionProvider>,
    max_attempts: u32,
    call_timeout: Duration,
}

impl LlmClient {
    /// Create a new client. `max_attempts` counts the first try.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        max_attempts: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            max_attempts: max_attempts.max(1),
            call_timeout,
        }
    }

    /// Issue a schema-constrained completion and deserialize the result.
    ///
    /// Retries on request failure, parse failure, or schema violation, with
    /// a stricter format instruction appended from the second attempt on.
    pub async fn complete_structured<T>(
        &self,
        system: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let mut last_err = LlmError::RequestFailed("no attempts made".to_string());

        for attempt in 1..=self.max_attempts {
            let mut full_prompt = prompt.to_string();
            if attempt > 1 {
                full_prompt.push_str(STRICT_FORMAT_INSTRUCTION);
                let backoff = Duration::from_millis(250 * (1 << (attempt - 2).min(4)));
                tokio::time::sleep(backoff).await;
            }

            let request = CompletionRequest {
                system: system.to_string(),
                prompt: full_prompt,
                schema: schema.clone(),
                temperature,
            };

            let result =
                match tokio::time::timeout(self.call_timeout, self.provider.complete(&request))
                    .await
                {
                    Ok(inner) => inner,
                    Err(_) => Err(LlmError::Timeout(self.call_timeout)),
                };

            match result {
                Ok(value) => match serde_json::from_value::<T>(value) {
                    Ok(parsed) => {
                        debug!(attempt, "structured completion succeeded");
                        return Ok(parsed);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "completion violated schema");
                        last_err = LlmError::SchemaViolation(e.to_string());
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

/// OpenAI-compatible chat-completions provider.
///
/// Works against any endpoint speaking the `/chat/completions` shape and
/// returning the JSON body as the message content.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatProvider {
    /// Create a provider for an OpenAI-compatible endpoint.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LlmError> {
        let system = format!(
            "{}\n\nRespond with a single JSON object matching this schema:\n{}",
            request.system, request.schema
        );
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": request.temperature,
            "response_format": {"type": "json_object"}
        });

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "completion API error ({}): {}",
                status, text
            )));
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Parse("missing message content".to_string()))?;

        serde_json::from_str(content).map_err(|e| LlmError::Parse(e.to_string()))
    }
}
