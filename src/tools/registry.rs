//! 工具注册表
//!
//! 所有内部工具实现 Tool trait（name / description / parameters_schema / invoke），由 ToolRegistry 按名注册与查找。
//! 注册表在启动时构建一次，之后只读共享；它的名字集合就是分类用的「内部工具名集合」。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};
use thiserror::Error;

use super::catalog::CatalogEntry;

/// 工具自身的失败（由执行器包装上工具名后转为错误结果）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// 内部工具：名称、描述（供 LLM 理解）、参数 Schema、异步执行（参数为 JSON 对象，结果为 JSON 值）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;

    fn catalog_entry(&self) -> CatalogEntry {
        CatalogEntry::from_json_schema(self.name(), self.description(), &self.parameters_schema())
    }
}

/// 由 schemars 派生的参数结构生成 JSON Schema
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// 把参数对象反序列化为工具自己的参数结构
pub fn parse_args<T: serde::de::DeserializeOwned>(args: &Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（BTreeMap 保证目录顺序稳定）
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice; keeping the later one");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> HashSet<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.tools.values().map(|tool| tool.catalog_entry()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
