//! Minimal chat-completion client for AI-backed tools.

use serde::{Deserialize, Serialize};

use crate::core::config::LlmConfig;
use crate::core::fallback::DependencyError;

/// Longest error body kept from a failed response.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
struct Credentials {
    endpoint: String,
    api_key: String,
}

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    model: String,
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcp-analysis-server/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeout)
            .build()?;

        let credentials = match (&config.endpoint, &config.api_key) {
            (Some(endpoint), Some(api_key)) if config.is_configured() => Some(Credentials {
                endpoint: endpoint.clone(),
                api_key: api_key.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            http,
            credentials,
            model: config.model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` and return the text of the first choice.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DependencyError> {
        let Some(Credentials { endpoint, api_key }) = &self.credentials else {
            return Err(DependencyError::NotConfigured);
        };

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
        };

        tracing::debug!(endpoint = %endpoint, model = %self.model, "Sending chat completion request");
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::MalformedResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| DependencyError::MalformedResponse("completion has no content".to_string()))
    }
}
