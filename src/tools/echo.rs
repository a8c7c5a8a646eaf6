//! Echo 工具（诊断用，配置 tools.echo = true 时注册）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tools::registry::{parse_args, schema_of};
use crate::tools::{Tool, ToolError};

#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    /// Text to echo back.
    text: String,
}

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged (diagnostics)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<EchoArgs>()
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let args: EchoArgs = parse_args(args)?;
        Ok(Value::String(args.text))
    }
}
