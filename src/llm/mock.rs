//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预先排好的 Completion / 错误，并记录每次调用收到的历史、目录与凭据，
//! 便于断言编排器喂给模型的内容。脚本用完后返回 ScriptExhausted。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{Completion, Credential, LlmClient, LlmError};
use crate::memory::{Message, ToolRequest};
use crate::tools::CatalogEntry;

/// 一次被记录的模型调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<Message>,
    pub catalog_names: Vec<String>,
    pub credential: Option<String>,
}

#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次调用返回纯文本
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(Ok(Completion::text(text)))
    }

    /// 下一次调用返回一组工具请求：(id, name, arguments)
    pub fn then_tools(self, requests: Vec<(&str, &str, Value)>) -> Self {
        let requests = requests
            .into_iter()
            .map(|(id, name, args)| {
                let arguments: Map<String, Value> = match args {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                ToolRequest::new(id, name, arguments)
            })
            .collect();
        self.then(Ok(Completion::tool_calls(requests)))
    }

    pub fn then_error(self, err: LlmError) -> Self {
        self.then(Err(err))
    }

    pub fn then(self, item: Result<Completion, LlmError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// 每次调用前先等待（用于超时测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        history: &[Message],
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<Completion, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                history: history.to_vec(),
                catalog_names: catalog.iter().map(|e| e.name.clone()).collect(),
                credential: credential.map(|c| c.expose().to_string()),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or(Err(LlmError::ScriptExhausted))
    }
}
