//! Decision service adapter: chat message types, token accounting and an
//! OpenAI-compatible `POST {api_url}/chat/completions` client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::agent::harness::LlmClient;
use crate::agent::wire::Direction;
use crate::config::LlmSettings;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
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

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub generated_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Running prompt/generated token totals shared across decision tasks.
/// Observability only.
#[derive(Debug, Clone, Default)]
pub struct TokenCounter {
    inner: Arc<TokenTotals>,
}

#[derive(Debug, Default)]
struct TokenTotals {
    prompt: AtomicU64,
    generated: AtomicU64,
}

impl TokenCounter {
    pub fn record(&self, usage: TokenUsage) {
        self.inner
            .prompt
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.inner
            .generated
            .fetch_add(usage.generated_tokens, Ordering::Relaxed);
    }

    pub fn totals(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.inner.prompt.load(Ordering::Relaxed),
            generated_tokens: self.inner.generated.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.inner.prompt.store(0, Ordering::Relaxed);
        self.inner.generated.store(0, Ordering::Relaxed);
    }
}

/// Models that take `max_completion_tokens` and reject a temperature override:
/// `o1`..`o9` as a whole word or followed by `-`/`_`, and `gpt-oss`.
pub fn is_reasoning_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    (0..bytes.len()).any(|i| {
        if i > 0 && is_word(bytes[i - 1]) {
            return false;
        }
        let rest = &bytes[i..];
        let o_series = rest.len() >= 2
            && rest[0] == b'o'
            && (b'1'..=b'9').contains(&rest[1])
            && rest
                .get(2)
                .is_none_or(|&c| !is_word(c) || c == b'_');
        let gpt_oss = rest.starts_with(b"gpt-oss") && rest.get(7).is_none_or(|&c| !is_word(c));
        o_series || gpt_oss
    })
}

/// JSON schema for the single action object the service must return.
pub fn action_response_format() -> Value {
    let directions: Vec<Value> = Direction::ALL
        .iter()
        .map(|d| Value::from(d.label()))
        .chain(std::iter::once(Value::Null))
        .collect();
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "amoeba_action",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["move", "feed", "divide", "idle"]
                    },
                    "direction": {
                        "type": ["string", "null"],
                        "enum": directions
                    },
                    "distance": { "type": ["number", "null"] }
                },
                "required": ["action", "direction", "distance"],
                "additionalProperties": false
            }
        }
    })
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageWire>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageWire {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub fn parse_response_body(body: &str) -> anyhow::Result<Completion> {
    let response: ChatResponse =
        serde_json::from_str(body).context("decision service response decode failed")?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .context("decision service returned no choices")?;
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            generated_tokens: u.completion_tokens,
        }),
    })
}

#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    http: Client,
    settings: LlmSettings,
}

impl OpenAiChatClient {
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .context("building decision service http client")?;
        Ok(Self { http, settings })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_url.trim_end_matches('/')
        )
    }

    pub fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "response_format": action_response_format(),
        });
        if is_reasoning_model(&request.model) {
            body["max_completion_tokens"] = json!(self.settings.max_tokens);
        } else {
            body["max_tokens"] = json!(self.settings.max_tokens);
            body["temperature"] = json!(self.settings.temperature);
        }
        body
    }

    async fn send(&self, request: ChatRequest) -> anyhow::Result<Completion> {
        let mut builder = self.http.post(self.endpoint()).json(&self.request_body(&request));
        if !self.settings.api_key.is_empty() {
            builder = builder.bearer_auth(&self.settings.api_key);
        }
        let res = builder
            .send()
            .await
            .context("decision service request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("decision service body read failed")?;
        if !status.is_success() {
            anyhow::bail!("decision service returned {status}: {body}");
        }
        parse_response_body(&body)
    }
}

impl LlmClient for OpenAiChatClient {
    fn complete<'a>(
        &'a self,
        request: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>> {
        Box::pin(self.send(request))
    }
}
