//! 编排器的请求 / 响应类型
//!
//! ChatRequest 是调用方的原始输入（query 与 tool_results 二选一），
//! validate 之后得到 TurnInput；ChatResponse 以 status 字段区分完成与待回填两种结果。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::OrchestratorError;
use crate::memory::{flatten_content, SessionId, ToolRequest, ToolResult};
use crate::tools::CatalogEntry;

/// 调用方回填的单个工具结果；content 可为任意 JSON，回放给模型前压平成字符串
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolResultItem {
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl ToolResultItem {
    pub fn new(tool_call_id: impl Into<String>, content: Value) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            content,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// 调用方提供的外部工具目录
    #[serde(default)]
    pub tools: Vec<CatalogEntry>,
    #[serde(default)]
    pub tool_results: Option<Vec<ToolResultItem>>,
}

/// 校验后的本次调用入口
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    NewQuery(String),
    Resume(Vec<ToolResult>),
}

impl ChatRequest {
    pub fn new_query(session_id: impl Into<SessionId>, query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn resume(session_id: impl Into<SessionId>, results: Vec<ToolResultItem>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            tool_results: Some(results),
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<CatalogEntry>) -> Self {
        self.tools = tools;
        self
    }

    /// query 与 tool_results 必须恰好给出一个；每个结果都要带 tool_call_id
    pub fn validate(&self) -> Result<TurnInput, OrchestratorError> {
        match (&self.query, &self.tool_results) {
            (Some(_), Some(_)) => Err(OrchestratorError::MalformedRequest(
                "provide either `query` or `tool_results`, not both".to_string(),
            )),
            (None, None) => Err(OrchestratorError::MalformedRequest(
                "one of `query` or `tool_results` is required".to_string(),
            )),
            (Some(query), None) => {
                if query.trim().is_empty() {
                    return Err(OrchestratorError::MalformedRequest("`query` is empty".to_string()));
                }
                Ok(TurnInput::NewQuery(query.clone()))
            }
            (None, Some(items)) => {
                if items.is_empty() {
                    return Err(OrchestratorError::MalformedRequest(
                        "`tool_results` is empty".to_string(),
                    ));
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match item.tool_call_id.as_deref() {
                        Some(id) if !id.is_empty() => Ok(ToolResult::ok(id, flatten_content(&item.content))),
                        _ => Err(OrchestratorError::MalformedRequest(format!(
                            "tool_results[{i}] is missing `tool_call_id`"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(TurnInput::Resume)
            }
        }
    }
}

/// 交还调用方执行的一条工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl From<&ToolRequest> for PlannedCall {
    fn from(request: &ToolRequest) -> Self {
        Self {
            tool_call_id: request.id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChatResponse {
    Completed {
        session_id: SessionId,
        response: String,
        tools_used: Vec<String>,
    },
    ToolCallsPending {
        session_id: SessionId,
        tools_used: Vec<String>,
        tool_call_plan: Vec<PlannedCall>,
    },
}

impl ChatResponse {
    pub fn completed(session_id: impl Into<SessionId>, response: impl Into<String>) -> Self {
        ChatResponse::Completed {
            session_id: session_id.into(),
            response: response.into(),
            tools_used: Vec::new(),
        }
    }

    pub fn pending(session_id: impl Into<SessionId>, plan: &[ToolRequest]) -> Self {
        ChatResponse::ToolCallsPending {
            session_id: session_id.into(),
            tools_used: plan.iter().map(|r| r.name.clone()).collect(),
            tool_call_plan: plan.iter().map(PlannedCall::from).collect(),
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            ChatResponse::Completed { session_id, .. } | ChatResponse::ToolCallsPending { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ChatResponse::ToolCallsPending { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// 失败时的结构化响应：{status:"error", session_id, error:{kind, message}}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub session_id: Option<SessionId>,
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn from_error(err: &OrchestratorError, session_id: Option<SessionId>) -> Self {
        Self {
            status: "error".to_string(),
            session_id,
            error: ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(body: Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_query_and_results_are_exclusive() {
        let both = parse(json!({"query": "hi", "tool_results": [{"tool_call_id": "a", "content": "x"}]}));
        assert_eq!(both.validate().unwrap_err().kind(), "malformed_request");

        let neither = parse(json!({"session_id": "s1"}));
        assert_eq!(neither.validate().unwrap_err().kind(), "malformed_request");

        let null_query = parse(json!({"query": null, "session_id": "s1"}));
        assert!(null_query.validate().is_err());
    }

    #[test]
    fn test_new_query() {
        let req = parse(json!({"query": "search for X", "session_id": "s1", "tools": []}));
        assert_eq!(req.validate().unwrap(), TurnInput::NewQuery("search for X".into()));
    }

    #[test]
    fn test_resume_flattens_structured_content() {
        let req = parse(json!({
            "session_id": "s1",
            "tool_results": [
                {"tool_call_id": "a", "content": "plain"},
                {"tool_call_id": "b", "content": [{"type": "text", "text": "from block"}]},
                {"tool_call_id": "c", "content": {"count": 2}}
            ]
        }));
        let TurnInput::Resume(results) = req.validate().unwrap() else {
            panic!("expected resume");
        };
        assert_eq!(results[0], ToolResult::ok("a", "plain"));
        assert_eq!(results[1], ToolResult::ok("b", "from block"));
        assert_eq!(results[2], ToolResult::ok("c", "{\n  \"count\": 2\n}"));
    }

    #[test]
    fn test_resume_requires_correlation_id() {
        let req = parse(json!({"session_id": "s1", "tool_results": [{"content": "orphan"}]}));
        let err = req.validate().unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
        assert!(err.to_string().contains("tool_results[0]"));
    }

    #[test]
    fn test_response_shapes() {
        let completed = serde_json::to_value(ChatResponse::completed("s1", "hello")).unwrap();
        assert_eq!(
            completed,
            json!({"status": "completed", "session_id": "s1", "response": "hello", "tools_used": []})
        );

        let mut args = Map::new();
        args.insert("to".into(), json!("a@b.c"));
        let plan = vec![ToolRequest::new("call_1", "send_mail", args)];
        let pending = serde_json::to_value(ChatResponse::pending("s1", &plan)).unwrap();
        assert_eq!(pending["status"], "tool_calls_pending");
        assert_eq!(pending["tools_used"], json!(["send_mail"]));
        assert_eq!(
            pending["tool_call_plan"],
            json!([{"tool_call_id": "call_1", "name": "send_mail", "arguments": {"to": "a@b.c"}}])
        );
    }

    #[test]
    fn test_error_response_shape() {
        let err = OrchestratorError::PlanConflict("s1".into());
        let body = serde_json::to_value(ErrorResponse::from_error(&err, Some("s1".into()))).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["kind"], "plan_conflict");
    }
}
