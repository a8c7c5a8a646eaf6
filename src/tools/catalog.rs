//! 工具目录条目：名称、描述、参数说明
//!
//! 调用方按请求提供外部工具目录（OpenAI function 形态或扁平形态均可），
//! 内部工具由 schemars 生成参数 Schema，两者都经 JSON Schema -> CatalogEntry 同一路径转换。

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// 单个参数说明；extra 保留 items / enum 等其余 Schema 键，回写给模型时原样带上
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub kind: String,
    pub description: String,
    pub required: bool,
    pub extra: Map<String, Value>,
}

impl ParameterSpec {
    pub fn new(kind: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            required,
            extra: Map::new(),
        }
    }

    fn to_property_schema(&self) -> Value {
        let mut schema = self.extra.clone();
        schema.insert("type".into(), Value::String(self.kind.clone()));
        if !self.description.is_empty() {
            schema.insert("description".into(), Value::String(self.description.clone()));
        }
        Value::Object(schema)
    }
}

/// 目录条目（编排器只读，不修改）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "CatalogWire")]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// 从 JSON Schema（type=object）构建；properties 缺失视为无参数
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &Value,
    ) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters = BTreeMap::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (param, prop) in properties {
                let mut extra = prop.as_object().cloned().unwrap_or_default();
                let kind = extra
                    .remove("type")
                    .and_then(|t| t.as_str().map(String::from))
                    .unwrap_or_else(|| "string".to_string());
                let description = extra
                    .remove("description")
                    .and_then(|d| d.as_str().map(String::from))
                    .unwrap_or_default();
                // schemars 生成的 title 对模型无用
                extra.remove("title");
                parameters.insert(
                    param.clone(),
                    ParameterSpec {
                        kind,
                        description,
                        required: required.contains(&param.as_str()),
                        extra,
                    },
                );
            }
        }

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// 参数部分的 JSON Schema
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(name, spec)| (name.clone(), spec.to_property_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// 模型 API 的 function tool 形态
    pub fn to_function_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }
}

#[derive(Deserialize)]
struct FunctionWire {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogWire {
    Wrapped { function: FunctionWire },
    Flat(FunctionWire),
}

impl TryFrom<CatalogWire> for CatalogEntry {
    type Error = String;

    fn try_from(wire: CatalogWire) -> Result<Self, Self::Error> {
        let function = match wire {
            CatalogWire::Wrapped { function } | CatalogWire::Flat(function) => function,
        };
        if function.name.trim().is_empty() {
            return Err("tool catalog entry has an empty name".to_string());
        }
        let schema = function.parameters.unwrap_or_else(|| json!({}));
        Ok(CatalogEntry::from_json_schema(
            function.name,
            function.description.unwrap_or_default(),
            &schema,
        ))
    }
}

/// 合并内部与外部目录：外部条目与内部重名时丢弃（分类按名字，内部优先）
pub fn merge_catalogs(internal: &[CatalogEntry], external: &[CatalogEntry]) -> Vec<CatalogEntry> {
    let mut merged: Vec<CatalogEntry> = internal.to_vec();
    for entry in external {
        if merged.iter().any(|e| e.name == entry.name) {
            tracing::warn!(tool = %entry.name, "external catalog entry shadows a tool already in the catalog; ignored");
            continue;
        }
        merged.push(entry.clone());
    }
    merged
}
