//! Language model capability and the OpenAI-compatible chat client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use doki_shared::{DokiError, LlmConfig, Result, resolve_api_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text generation. One call per `generate`, no retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Build the chat model described by `[llm]`.
pub fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let api_key = resolve_api_key(&config.api_key_env, "LLM")?;
    Ok(Arc::new(OpenAiCompatibleChat::new(
        &api_key,
        &config.base_url,
        &config.model,
        config.temperature,
        Duration::from_secs(config.timeout_secs),
    )?))
}

/// Client for `/chat/completions` on Groq, OpenAI, LM Studio and similar.
#[derive(Clone)]
pub struct OpenAiCompatibleChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleChat {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        temperature: Option<f32>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DokiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let (Some(t), Some(obj)) = (self.temperature, body.as_object_mut()) {
            obj.insert("temperature".to_string(), json!(t));
        }

        debug!(model = %self.model, messages = messages.len(), "chat completion request");
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DokiError::Generation(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(DokiError::Generation(format!("chat completion failed ({status}): {text}")));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| DokiError::Generation(format!("invalid chat completion response: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DokiError::Generation("chat completion response has no content".into()))
    }
}
