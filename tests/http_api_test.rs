//! HTTP 入口集成测试：tower::ServiceExt::oneshot 直接驱动 Router

#![cfg(feature = "server")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use bee_orchestrator::core::Orchestrator;
use bee_orchestrator::llm::ScriptedLlmClient;
use bee_orchestrator::memory::SessionStore;
use bee_orchestrator::server::router;
use bee_orchestrator::tools::{EchoTool, ToolExecutor, ToolRegistry};

fn app(llm: ScriptedLlmClient) -> (Arc<ScriptedLlmClient>, axum::Router) {
    let llm = Arc::new(llm);
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let orchestrator = Orchestrator::new(llm.clone(), ToolExecutor::new(registry, 5), SessionStore::new(20));
    (llm, router(Arc::new(orchestrator)))
}

fn post_ask(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health() {
    let (_, app) = app(ScriptedLlmClient::new());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ask_completes_with_header_credential() {
    let (llm, app) = app(ScriptedLlmClient::new().then_text("hello there"));
    let mut request = post_ask(json!({"query": "hi", "session_id": "s1", "tools": []}));
    request
        .headers_mut()
        .insert("openai-api-key", "sk-from-header".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"status": "completed", "session_id": "s1", "response": "hello there", "tools_used": []})
    );
    assert_eq!(llm.calls()[0].credential.as_deref(), Some("sk-from-header"));
}

#[tokio::test]
async fn ask_returns_external_plan_for_wrapped_catalog_entry() {
    let (llm, app) = app(
        ScriptedLlmClient::new().then_tools(vec![("call_7", "fetch_mail", json!({"folder": "inbox"}))]),
    );
    let body = json!({
        "query": "check my mail",
        "session_id": "s2",
        "tools": [{
            "type": "function",
            "function": {
                "name": "fetch_mail",
                "description": "Fetch mail",
                "parameters": {
                    "type": "object",
                    "properties": {"folder": {"type": "string"}},
                    "required": ["folder"]
                }
            }
        }]
    });

    let response = app.oneshot(post_ask(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "tool_calls_pending");
    assert_eq!(json["tools_used"], json!(["fetch_mail"]));
    assert_eq!(
        json["tool_call_plan"],
        json!([{"tool_call_id": "call_7", "name": "fetch_mail", "arguments": {"folder": "inbox"}}])
    );
    assert_eq!(llm.calls()[0].catalog_names, vec!["echo", "fetch_mail"]);
}

#[tokio::test]
async fn malformed_request_is_400_with_error_body() {
    let (llm, app) = app(ScriptedLlmClient::new());
    let response = app
        .oneshot(post_ask(json!({"session_id": "s3"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["session_id"], "s3");
    assert_eq!(json["error"]["kind"], "malformed_request");
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn invalid_json_is_malformed_request() {
    let (_, app) = app(ScriptedLlmClient::new());
    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"]["kind"], "malformed_request");
}

#[tokio::test]
async fn generated_session_can_be_inspected() {
    let (_, app) = app(ScriptedLlmClient::new().then_text("answer"));
    let response = app
        .clone()
        .oneshot(post_ask(json!({"query": "no session id"})))
        .await
        .unwrap();
    let session_id = read_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(session_id.starts_with("session_"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/sessions/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = read_json(response).await;
    assert_eq!(snapshot["history"][0], json!({"role": "user", "content": "no session id"}));
    assert_eq!(snapshot["history"][1]["role"], "assistant");
    assert!(snapshot["pending_plan"].is_null());
    assert!(snapshot["created_at"].is_string());

    let missing = app
        .oneshot(Request::builder().uri("/sessions/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let json = read_json(missing).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["session_id"], "nope");
    assert_eq!(json["error"]["kind"], "session_not_found");
}

#[tokio::test]
async fn snapshot_of_busy_session_is_409_without_waiting() {
    let (_, app) = app(
        ScriptedLlmClient::new()
            .then_text("slow answer")
            .with_delay(std::time::Duration::from_millis(300)),
    );
    let turn = tokio::spawn(
        app.clone()
            .oneshot(post_ask(json!({"query": "take your time", "session_id": "busy"}))),
    );
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        app.clone()
            .oneshot(Request::builder().uri("/sessions/busy").body(Body::empty()).unwrap()),
    )
    .await
    .expect("snapshot must not wait for the running turn")
    .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"]["kind"], "session_busy");

    assert_eq!(turn.await.unwrap().unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn mixed_plan_is_server_error() {
    let (_, app) = app(ScriptedLlmClient::new().then_tools(vec![
        ("c1", "echo", json!({"text": "x"})),
        ("c2", "send_mail", json!({})),
    ]));
    let response = app
        .oneshot(post_ask(json!({
            "query": "both",
            "session_id": "s4",
            "tools": [{"name": "send_mail", "description": "Send", "parameters": {"type": "object", "properties": {}}}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["error"]["kind"], "mixed_plan");
}
