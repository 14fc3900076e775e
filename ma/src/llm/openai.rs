//! Chat Completions gateway
//!
//! One request per call; transient failures are retried with backoff before
//! the error reaches the agents.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage};
use crate::config::LlmConfig;

const MAX_RETRIES: u32 = 3;

const INITIAL_BACKOFF_MS: u64 = 1000;

/// Longest we honor a server-provided retry-after
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// o-series and gpt-5 models take max_completion_tokens and no temperature
fn is_reasoning_model(model: &str) -> bool {
    ["gpt-5", "o1", "o3", "o4"].iter().any(|prefix| model.starts_with(prefix))
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Result of a single HTTP exchange
enum Exchange {
    Done(CompletionResponse),
    Retry { error: LlmError, wait: Option<Duration> },
}

pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenAIClient {
    /// Reads the API key from the environment variable named in the config
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "from_config: called");
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
        })
    }

    fn chat_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatBody<'a> {
        debug!(model = %self.model, %request.max_tokens, "chat_body: called");

        let system = (!request.system_prompt.is_empty()).then(|| ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        let user = ChatMessage {
            role: "user",
            content: &request.user_prompt,
        };
        let messages = system.into_iter().chain(std::iter::once(user)).collect();

        let limit = request.max_tokens.min(self.max_tokens);
        let reasoning = is_reasoning_model(&self.model);
        ChatBody {
            model: &self.model,
            messages,
            max_tokens: (!reasoning).then_some(limit),
            max_completion_tokens: reasoning.then_some(limit),
            temperature: (!reasoning).then_some(self.temperature),
        }
    }

    async fn exchange(&self, url: &str, body: &ChatBody<'_>) -> Result<Exchange, LlmError> {
        let sent = self.http.post(url).bearer_auth(&self.api_key).json(body).send().await;
        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return retry_or_fail(LlmError::Timeout(self.timeout), None),
            Err(e) => return retry_or_fail(LlmError::Network(e), None),
        };

        let status = response.status();
        if status.is_success() {
            let chat: ChatResponse = response.json().await?;
            return Ok(Exchange::Done(chat.into_completion()));
        }

        let code = status.as_u16();
        if code == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(MAX_RATE_LIMIT_WAIT);
            return retry_or_fail(
                LlmError::RateLimited { retry_after },
                Some(retry_after.min(MAX_RATE_LIMIT_WAIT)),
            );
        }

        let message = response.text().await.unwrap_or_default();
        retry_or_fail(LlmError::ApiError { status: code, message }, None)
    }
}

fn retry_or_fail(error: LlmError, wait: Option<Duration>) -> Result<Exchange, LlmError> {
    if error.is_retryable() {
        Ok(Exchange::Retry { error, wait })
    } else {
        Err(error)
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.chat_body(&request);

        let mut attempt = 0;
        loop {
            match self.exchange(&url, &body).await? {
                Exchange::Done(response) => {
                    debug!(attempt, "complete: success");
                    return Ok(response);
                }
                Exchange::Retry { error, .. } if attempt >= MAX_RETRIES => return Err(error),
                Exchange::Retry { error, wait } => {
                    attempt += 1;
                    let backoff =
                        wait.unwrap_or_else(|| Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1)));
                    warn!(attempt, error = %error, backoff_ms = backoff.as_millis() as u64, "complete: transient failure");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl ChatResponse {
    fn into_completion(self) -> CompletionResponse {
        let usage = self
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        match self.choices.into_iter().next() {
            Some(choice) => CompletionResponse {
                content: choice.message.content,
                stop_reason: choice
                    .finish_reason
                    .as_deref()
                    .map(StopReason::from_openai)
                    .unwrap_or(StopReason::EndTurn),
                usage,
            },
            None => CompletionResponse {
                content: None,
                stop_reason: StopReason::EndTurn,
                usage,
            },
        }
    }
}
