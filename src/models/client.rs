use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::traits::Completer;
use super::types::{ApiErrorBody, ChatMessage, ChatRequest, ChatResponse, MessageRole, ModelDescriptor};
use crate::app::OpenRouterConfig;
use crate::constants::NO_RESPONSE_SENTINEL;
use crate::utils::{ChorusError, Result};

/// Completion client for the OpenRouter routing API.
/// Stateless per call; the only mutable piece is the credential, which the
/// interactive key prompt may supply after startup.
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    referer: String,
    title: String,
    temperature: f32,
    max_tokens: u32,
    api_key: RwLock<Option<String>>,
}

impl OpenRouterClient {
    pub fn new(config: &OpenRouterConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChorusError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: RwLock::new(normalize_key(api_key)),
        })
    }

    /// Replace the routing credential. A blank key clears it.
    pub fn set_api_key(&self, key: impl Into<String>) {
        *self.api_key.write() = normalize_key(Some(key.into()));
    }

    fn build_request(&self, model: &ModelDescriptor, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: model.backend_route_id.clone(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Completer for OpenRouterClient {
    async fn complete(&self, model: &ModelDescriptor, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .read()
            .clone()
            .ok_or(ChorusError::MissingCredential)?;

        if prompt.trim().is_empty() {
            return Err(ChorusError::InvalidInput("Message cannot be empty".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %model.backend_route_id, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&self.build_request(model, prompt))
            .send()
            .await
            .map_err(|e| ChorusError::Backend(format!("OpenRouter request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChorusError::Backend(api_error_message(status, &body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChorusError::Backend(format!("OpenRouter request failed: {e}")))?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ChorusError::Backend(format!("OpenRouter API error: malformed response: {e}"))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                model = %model.backend_route_id,
                total_tokens = usage.total_tokens,
                "completion received"
            );
        }

        Ok(parsed
            .first_content()
            .map(str::to_string)
            .unwrap_or_else(|| NO_RESPONSE_SENTINEL.to_string()))
    }

    fn has_credential(&self) -> bool {
        self.api_key.read().is_some()
    }

    fn set_credential(&self, key: &str) {
        self.set_api_key(key);
    }
}

fn normalize_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

/// Human-readable message for a non-2xx response: the backend's own
/// `error.message` when present, otherwise the status line.
fn api_error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty());

    match detail {
        Some(message) => format!("OpenRouter API error: {}", message),
        None => format!(
            "OpenRouter API error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string(),
    }
}
