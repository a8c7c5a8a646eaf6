//! OpenAI 兼容 chat-completions 客户端
//!
//! 通过 reqwest 调用任意 OpenAI 兼容端点（可配置 base_url）：历史经 translate 转为消息记录，
//! 目录转为 function tools，取首个 choice 的 message 翻译回 Completion。
//! API Key 优先用请求透传的凭据，其次用配置 / 环境变量里的默认 Key。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::translate::{from_external, outbound_records, ExternalMessageRecord};
use crate::llm::{Completion, Credential, LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::CatalogEntry;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ExternalMessageRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ExternalMessageRecord,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
    default_api_key: Option<Credential>,
    system_prompt: Option<String>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, timeout_secs: u64) -> Self {
        let default_api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .map(Credential::new);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            default_api_key,
            system_prompt: None,
            usage: TokenUsage::new(),
        }
    }

    /// 每次调用前置的 system prompt（不写入会话历史）
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn build_request(&self, history: &[Message], catalog: &[CatalogEntry]) -> ChatRequest<'_> {
        let tools: Vec<Value> = catalog.iter().map(CatalogEntry::to_function_tool).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");
        ChatRequest {
            model: &self.model,
            messages: outbound_records(self.system_prompt.as_deref(), history),
            tools,
            tool_choice,
        }
    }
}

fn status_error(status: StatusCode, body: String, retry_after: Option<u64>) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited {
            retry_after_ms: retry_after.map(|secs| secs * 1000),
        }
    } else {
        LlmError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        history: &[Message],
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<Completion, LlmError> {
        let api_key = credential
            .or(self.default_api_key.as_ref())
            .ok_or(LlmError::MissingCredential)?;
        let request = self.build_request(history, catalog);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, retry_after));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        if let Some(usage) = &body.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
            let (_, _, total) = self.usage.get();
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cumulative_total = total,
                "token usage"
            );
        }

        let record = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Decode("response has no choices".to_string()))?;

        match from_external(record)? {
            Message::Assistant {
                content,
                tool_requests,
            } => Ok(Completion {
                text: (!content.is_empty()).then_some(content),
                tool_requests,
            }),
            other => Err(LlmError::Decode(format!(
                "expected an assistant message, got role `{}`",
                other.role()
            ))),
        }
    }
}
