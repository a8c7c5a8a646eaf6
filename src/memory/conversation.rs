//! 短期记忆：会话内的消息模型与有界历史
//!
//! Message 是 system / user / assistant / tool 四种角色的封闭枚举；
//! ConversationMemory 只保留最近 N 条消息，超出时从最旧处剪枝（FIFO），顺序即因果顺序。

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 模型请求的一次工具调用：id 在单轮内唯一，参数为 JSON 对象
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 一次模型回合请求的有序工具调用序列
pub type ToolCallPlan = Vec<ToolRequest>;

/// 工具执行失败（已被就地恢复，不中断本轮）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub tool: String,
    pub message: String,
}

/// 工具结果：对应某个 ToolRequest 的 id，内容为扁平化后的字符串或失败标记
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub outcome: Result<String, ToolFailure>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: Ok(content.into()),
        }
    }

    pub fn failed(
        tool_call_id: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: Err(ToolFailure {
                tool: tool.into(),
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// 转为 tool 消息；失败结果渲染为带工具名的 JSON 错误文本，让模型看到失败原因
    pub fn into_message(self) -> Message {
        let content = match self.outcome {
            Ok(content) => content,
            Err(failure) => serde_json::json!({
                "error": "tool_execution_failed",
                "tool": failure.tool,
                "message": failure.message,
            })
            .to_string(),
        };
        Message::Tool {
            tool_call_id: self.tool_call_id,
            content,
        }
    }
}

/// 把结构化结果压平成回放给模型的字符串：
/// `[{"type":"text","text":..}, ..]` 取首段文本；对象 / 数组输出缩进 JSON；字符串原样；其他标量用 JSON 文本
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => match items.first().and_then(|first| first.get("text")) {
            Some(Value::String(text)) => text.clone(),
            _ => serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string()),
        },
        Value::Object(_) => {
            serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string())
        }
        other => other.to_string(),
    }
}

/// 单条消息（按角色区分的封闭集合）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    /// 文本可为空；带工具调用时即为一个 ToolCallPlan
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_requests: Vec<ToolRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_requests: Vec::new(),
        }
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_requests,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn tool_requests(&self) -> &[ToolRequest] {
        match self {
            Message::Assistant { tool_requests, .. } => tool_requests,
            _ => &[],
        }
    }
}

/// 有界对话历史：最多保留 max_messages 条，超出时丢弃最旧的
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push_back(msg);
        self.prune();
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// 找不到先前 assistant 请求的 tool 消息 id（FIFO 剪掉了发起请求的 assistant）
    pub fn orphaned_tool_ids(&self) -> Vec<&str> {
        let mut requested: HashSet<&str> = HashSet::new();
        let mut orphaned = Vec::new();
        for message in &self.messages {
            match message {
                Message::Assistant { tool_requests, .. } => {
                    requested.extend(tool_requests.iter().map(|r| r.id.as_str()));
                }
                Message::Tool { tool_call_id, .. } if !requested.contains(tool_call_id.as_str()) => {
                    orphaned.push(tool_call_id.as_str());
                }
                _ => {}
            }
        }
        orphaned
    }

    fn prune(&mut self) {
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
