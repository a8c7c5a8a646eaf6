//! 内部工具执行器
//!
//! 持有只读的 ToolRegistry 与单次调用超时。execute_plan 先校验整批工具名（未知名字整批失败，不产生副作用），
//! 再逐个调用：每个调用独立加超时，失败 / 超时就地转为带错误标记的 ToolResult，不影响同批其他调用。
//! 同批调用并发执行，结果按请求顺序重新组装；每次调用输出结构化审计日志（JSON）。

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::core::OrchestratorError;
use crate::memory::{flatten_content, ToolRequest, ToolResult};
use crate::tools::{CatalogEntry, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    internal_names: HashSet<String>,
    catalog: Vec<CatalogEntry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        let internal_names = registry.tool_names();
        let catalog = registry.catalog();
        Self {
            registry,
            internal_names,
            catalog,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 内部工具名集合（分类依据）
    pub fn internal_names(&self) -> &HashSet<String> {
        &self.internal_names
    }

    /// 内部工具目录（随每次模型调用一起提供）
    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub async fn execute_plan(&self, plan: &[ToolRequest]) -> Result<Vec<ToolResult>, OrchestratorError> {
        if let Some(unknown) = plan.iter().find(|r| !self.registry.contains(&r.name)) {
            return Err(OrchestratorError::UnknownTool(unknown.name.clone()));
        }
        Ok(join_all(plan.iter().map(|request| self.execute_one(request))).await)
    }

    async fn execute_one(&self, request: &ToolRequest) -> ToolResult {
        let Some(tool) = self.registry.get(&request.name) else {
            return ToolResult::failed(&request.id, &request.name, "tool not registered");
        };

        let start = Instant::now();
        let result = timeout(self.timeout, tool.invoke(&request.arguments)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "tool_call_id": request.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&request.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => ToolResult::ok(&request.id, flatten_content(&value)),
            Ok(Err(e)) => ToolResult::failed(&request.id, &request.name, e.to_string()),
            Err(_) => ToolResult::failed(
                &request.id,
                &request.name,
                format!("timed out after {}s", self.timeout.as_secs()),
            ),
        }
    }
}

fn args_preview(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
