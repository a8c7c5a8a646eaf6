//! 模型调用抽象
//!
//! 编排器只依赖 LlmClient：给定完整历史与工具目录，返回文本或一组工具调用请求。
//! 凭据（如 API Key）按请求透传，不做检查也不保存。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::TranslateError;
use crate::memory::{Message, ToolRequest};
use crate::tools::CatalogEntry;

/// 按请求透传的不透明凭据；Debug 输出脱敏
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// 一次模型调用的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_requests: Vec<ToolRequest>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_requests: Vec::new(),
        }
    }

    pub fn tool_calls(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: None,
            tool_requests,
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    /// 写入会话历史的 assistant 消息
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.text.unwrap_or_default(), self.tool_requests)
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Model API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("No API key available for the model call")]
    MissingCredential,

    #[error("Model call timed out after {0}s")]
    Timeout(u64),

    #[error("Scripted client has no response left")]
    ScriptExhausted,

    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// 模型调用客户端
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        history: &[Message],
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<Completion, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
