//! Chat-completions client for OpenRouter and compatible endpoints.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use punt_ai::{FeedbackGenerator, GenerateRequest, GeneratedReply, ReportGenerator};
use punt_core::RemoteError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const APP_TITLE: &str = "PUNT! Schrijfomgeving";
const APP_URL: &str = "https://github.com/punt-schrijfomgeving/punt";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("completion has no content")]
    EmptyContent,
}

#[derive(Clone)]
pub struct GatewayConfig {
    /// Like `https://openrouter.ai/api/v1`; a trailing slash is ignored.
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

/// OpenRouter chat-completions client implementing both generator traits.
pub struct OpenRouterClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl OpenRouterClient {
    pub fn new(mut config: GatewayConfig) -> Result<Self, GatewayError> {
        config.api_base = config.api_base.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base)
    }

    fn body<'a>(&'a self, request: &'a GenerateRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.user_prompt,
        });
        ChatRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    /// Send one completion request and return the first choice's content.
    pub async fn complete(&self, request: &GenerateRequest) -> Result<GeneratedReply, GatewayError> {
        let url = self.endpoint();
        info!(url = %url, model = %self.config.model, json = request.json_output, "requesting completion");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", APP_URL)
            .header("X-Title", APP_TITLE)
            .json(&self.body(request))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let reply = parse_completion(&resp.text().await?)?;
        info!(model = ?reply.model, tokens = ?reply.tokens_used, "completion received");
        Ok(reply)
    }

    fn remote_error(&self, e: GatewayError) -> RemoteError {
        warn!(error = %e, "completion failed");
        match e {
            GatewayError::Http(e) if e.is_timeout() => RemoteError::Timeout(self.config.timeout),
            GatewayError::Http(e) => RemoteError::Unavailable(e.to_string()),
            GatewayError::Server { status, body } => RemoteError::Status { status, body },
            GatewayError::Json(e) => RemoteError::Unavailable(format!("unreadable response: {e}")),
            GatewayError::EmptyContent => RemoteError::EmptyContent,
        }
    }
}

fn parse_completion(raw: &str) -> Result<GeneratedReply, GatewayError> {
    let parsed: ChatResponse = serde_json::from_str(raw)?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(GatewayError::EmptyContent)?;
    Ok(GeneratedReply {
        text,
        model: parsed.model,
        tokens_used: parsed.usage.and_then(|u| u.total_tokens),
    })
}

#[async_trait]
impl FeedbackGenerator for OpenRouterClient {
    async fn generate_feedback(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedReply, RemoteError> {
        self.complete(request).await.map_err(|e| self.remote_error(e))
    }
}

#[async_trait]
impl ReportGenerator for OpenRouterClient {
    async fn generate_report(&self, request: &GenerateRequest) -> Result<String, RemoteError> {
        self.complete(request)
            .await
            .map(|reply| reply.text)
            .map_err(|e| self.remote_error(e))
    }
}
