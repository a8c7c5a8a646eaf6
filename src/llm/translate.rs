//! 消息翻译：内部 Message <-> 模型 API 的消息记录（OpenAI chat-completions 形态）
//!
//! 对系统自己产生的所有消息形态，from_external(to_external(m)) == m。
//! 带工具调用的 assistant 文本为空时输出 content: null；读回时 null / 缺失的 content 一律视为空串。
//! 工具参数出站时序列化为 JSON 字符串，入站时解析回 JSON 对象。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::memory::{Message, ToolRequest};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("unknown role `{0}`")]
    UnknownRole(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("arguments for tool `{tool}` are not a JSON object: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// 模型 API 的单条消息记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMessageRecord {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ExternalToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: ExternalFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFunctionCall {
    pub name: String,
    /// JSON 编码后的参数对象
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ExternalMessageRecord {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

pub fn to_external(message: &Message) -> ExternalMessageRecord {
    match message {
        Message::System { content } => ExternalMessageRecord::plain("system", content),
        Message::User { content } => ExternalMessageRecord::plain("user", content),
        Message::Assistant {
            content,
            tool_requests,
        } if tool_requests.is_empty() => ExternalMessageRecord::plain("assistant", content),
        Message::Assistant {
            content,
            tool_requests,
        } => ExternalMessageRecord {
            role: "assistant".to_string(),
            content: (!content.is_empty()).then(|| content.clone()),
            tool_calls: Some(tool_requests.iter().map(to_external_call).collect()),
            tool_call_id: None,
        },
        Message::Tool {
            tool_call_id,
            content,
        } => ExternalMessageRecord {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn to_external_call(request: &ToolRequest) -> ExternalToolCall {
    ExternalToolCall {
        id: request.id.clone(),
        kind: function_kind(),
        function: ExternalFunctionCall {
            name: request.name.clone(),
            arguments: Value::Object(request.arguments.clone()).to_string(),
        },
    }
}

pub fn from_external(record: ExternalMessageRecord) -> Result<Message, TranslateError> {
    let content = record.content.unwrap_or_default();
    match record.role.as_str() {
        "system" => Ok(Message::System { content }),
        "user" => Ok(Message::User { content }),
        "assistant" => {
            let tool_requests = record
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(from_external_call)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Message::Assistant {
                content,
                tool_requests,
            })
        }
        "tool" => {
            let tool_call_id = record
                .tool_call_id
                .ok_or_else(|| TranslateError::MissingField("tool_call_id".to_string()))?;
            Ok(Message::Tool {
                tool_call_id,
                content,
            })
        }
        other => Err(TranslateError::UnknownRole(other.to_string())),
    }
}

fn from_external_call(call: ExternalToolCall) -> Result<ToolRequest, TranslateError> {
    let arguments = parse_arguments(&call.function.name, &call.function.arguments)?;
    Ok(ToolRequest {
        id: call.id,
        name: call.function.name,
        arguments,
    })
}

/// 空串视为无参数；其余必须是 JSON 对象
pub fn parse_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>, TranslateError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let invalid = |reason: String| TranslateError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw).map_err(|e| invalid(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(invalid(format!("expected object, got {other}"))),
    }
}

/// 组装发给模型的消息序列（只影响出站副本，不改动会话历史）：
/// - 有 system prompt 时放在最前；
/// - 丢弃找不到对应 assistant 请求的 tool 消息（FIFO 剪枝后留下的孤儿）；
/// - assistant 中没有任何结果回应的工具请求从 tool_calls 中去掉，只在文本里注明。
pub fn outbound_records(system_prompt: Option<&str>, history: &[Message]) -> Vec<ExternalMessageRecord> {
    let answered: HashSet<&str> = history
        .iter()
        .filter_map(|m| match m {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    let mut requested: HashSet<&str> = HashSet::new();

    let mut records = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        records.push(ExternalMessageRecord::plain("system", prompt));
    }

    for message in history {
        match message {
            Message::Tool { tool_call_id, .. } if !requested.contains(tool_call_id.as_str()) => {
                tracing::debug!(tool_call_id = %tool_call_id, "orphaned tool message left out of model request");
            }
            Message::Assistant {
                content,
                tool_requests,
            } if tool_requests.iter().any(|r| !answered.contains(r.id.as_str())) => {
                let (kept, unanswered): (Vec<ToolRequest>, Vec<ToolRequest>) = tool_requests
                    .iter()
                    .cloned()
                    .partition(|r| answered.contains(r.id.as_str()));
                requested.extend(
                    tool_requests
                        .iter()
                        .filter(|r| answered.contains(r.id.as_str()))
                        .map(|r| r.id.as_str()),
                );
                let names: Vec<&str> = unanswered.iter().map(|r| r.name.as_str()).collect();
                let note = format!("[requested tools without results: {}]", names.join(", "));
                let text = if content.is_empty() {
                    note
                } else {
                    format!("{content}\n{note}")
                };
                records.push(to_external(&Message::assistant_with_tools(text, kept)));
            }
            Message::Assistant { tool_requests, .. } => {
                requested.extend(tool_requests.iter().map(|r| r.id.as_str()));
                records.push(to_external(message));
            }
            _ => records.push(to_external(message)),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::system("be helpful"),
            Message::user("search for rust"),
            Message::user(""),
            Message::assistant("plain answer"),
            Message::assistant(""),
            Message::assistant_with_tools(
                "",
                vec![ToolRequest::new("call_1", "web_search", args(json!({"query": "rust"})))],
            ),
            Message::assistant_with_tools(
                "let me check",
                vec![
                    ToolRequest::new("call_2", "send_email", args(json!({"to_addr": "a@b.c", "cc": ["x"], "n": 3}))),
                    ToolRequest::new("call_3", "fetch_latest_email", Map::new()),
                ],
            ),
            Message::tool("call_1", "{\"results\": []}"),
            Message::tool("call_3", ""),
        ]
    }

    #[test]
    fn test_round_trip_is_lossless() {
        for message in sample_messages() {
            let back = from_external(to_external(&message)).unwrap();
            assert_eq!(back, message);
        }
    }

    #[test]
    fn test_round_trip_through_json_wire() {
        for message in sample_messages() {
            let wire = serde_json::to_string(&to_external(&message)).unwrap();
            let record: ExternalMessageRecord = serde_json::from_str(&wire).unwrap();
            assert_eq!(from_external(record).unwrap(), message);
        }
    }

    #[test]
    fn test_assistant_with_tools_has_null_content() {
        let record = to_external(&Message::assistant_with_tools(
            "",
            vec![ToolRequest::new("c", "web_scrap", args(json!({"url": "https://x"})))],
        ));
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["content"], Value::Null);
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{\"url\":\"https://x\"}");
    }

    #[test]
    fn test_null_and_missing_content_become_empty() {
        let record: ExternalMessageRecord =
            serde_json::from_value(json!({"role": "assistant", "content": null})).unwrap();
        assert_eq!(from_external(record).unwrap(), Message::assistant(""));

        let record: ExternalMessageRecord = serde_json::from_value(json!({"role": "user"})).unwrap();
        assert_eq!(from_external(record).unwrap(), Message::user(""));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let record: ExternalMessageRecord =
            serde_json::from_value(json!({"role": "function", "content": "x"})).unwrap();
        assert_eq!(
            from_external(record),
            Err(TranslateError::UnknownRole("function".into()))
        );
    }

    #[test]
    fn test_tool_record_requires_id() {
        let record: ExternalMessageRecord =
            serde_json::from_value(json!({"role": "tool", "content": "x"})).unwrap();
        assert_eq!(
            from_external(record),
            Err(TranslateError::MissingField("tool_call_id".into()))
        );
    }

    #[test]
    fn test_provider_tool_call_shape_parses() {
        let record: ExternalMessageRecord = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "refusal": null,
            "tool_calls": [
                {"id": "call_abc", "type": "function", "function": {"name": "web_search", "arguments": "{\"query\":\"x\"}"}},
                {"id": "call_def", "type": "function", "function": {"name": "fetch_latest_email", "arguments": ""}}
            ]
        }))
        .unwrap();
        let message = from_external(record).unwrap();
        let requests = message.tool_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].arguments["query"], "x");
        assert!(requests[1].arguments.is_empty());
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(matches!(
            parse_arguments("web_search", "[1,2]"),
            Err(TranslateError::InvalidArguments { tool, .. }) if tool == "web_search"
        ));
        assert!(parse_arguments("web_search", "{not json").is_err());
    }

    #[test]
    fn test_outbound_prepends_system_and_drops_orphans() {
        let history = vec![
            Message::tool("evicted_call", "stale"),
            Message::user("hi"),
            Message::assistant_with_tools("", vec![ToolRequest::new("c1", "web_search", Map::new())]),
            Message::tool("c1", "found"),
            Message::assistant("done"),
        ];
        let records = outbound_records(Some("system prompt"), &history);
        let roles: Vec<&str> = records.iter().map(|r| r.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
        assert_eq!(records[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_outbound_strips_unanswered_requests() {
        let history = vec![
            Message::user("mix it"),
            Message::assistant_with_tools(
                "",
                vec![
                    ToolRequest::new("i1", "web_search", Map::new()),
                    ToolRequest::new("e1", "send_email", Map::new()),
                ],
            ),
            Message::user("try again"),
        ];
        let records = outbound_records(None, &history);
        assert_eq!(records.len(), 3);
        assert!(records[1].tool_calls.is_none());
        let text = records[1].content.as_deref().unwrap();
        assert!(text.contains("web_search") && text.contains("send_email"));
    }
}
