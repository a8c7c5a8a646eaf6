//! HTTP 入口（feature `server`）
//!
//! - `POST /ask`：新问题或回填外部工具结果；凭据取自 `openai-api-key` 或 `Authorization: Bearer`
//! - `GET /sessions/:id`：会话快照（历史、待回填计划、时间戳）；会话正在处理调用时返回 409，不等待
//! - `GET /health`
//!
//! 错误统一返回 `{status:"error", session_id, error:{kind, message}}`。

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;

use crate::core::{ChatRequest, ErrorResponse, Orchestrator, OrchestratorError};
use crate::llm::Credential;

pub const API_KEY_HEADER: &str = "openai-api-key";

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/sessions/:id", get(session_snapshot))
        .route("/health", get(|| async { "OK" }))
        .with_state(orchestrator)
}

/// 监听 bind 并服务，直到 shutdown 被取消
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    bind: &str,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// 从请求头取出透传给模型的凭据；`openai-api-key` 优先
pub fn credential_from_headers(headers: &HeaderMap) -> Option<Credential> {
    let direct = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    direct.or_else(bearer).map(Credential::new)
}

fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::PlanConflict(_) | OrchestratorError::SessionBusy(_) => StatusCode::CONFLICT,
        OrchestratorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::CollaboratorUnavailable(_) => StatusCode::BAD_GATEWAY,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &OrchestratorError, session_id: Option<String>) -> Response {
    (status_for(err), Json(ErrorResponse::from_error(err, session_id))).into_response()
}

async fn ask(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let mut request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = OrchestratorError::MalformedRequest(rejection.body_text());
            return error_response(&err, None);
        }
    };

    // 先确定 session_id，错误响应里也能带上
    let session_id = request
        .session_id
        .take()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));
    request.session_id = Some(session_id.clone());

    match orchestrator.handle(request, credential_from_headers(&headers)).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(&err, Some(session_id)),
    }
}

async fn session_snapshot(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Response {
    match orchestrator.snapshot(&id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(&err, Some(id)),
    }
}
