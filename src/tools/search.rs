//! web_search 工具：通过 Tavily 搜索 API 返回最相关的若干条网页结果
//!
//! 搜索深度 advanced、话题 general、每个来源最多 chunks_per_source 段、不带原始正文。
//! 无结果时返回空数组。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::registry::{parse_args, schema_of};
use crate::tools::tavily::TavilyClient;
use crate::tools::{Tool, ToolError};

#[derive(Deserialize, JsonSchema)]
struct WebSearchArgs {
    /// A natural language search query to look up on the web.
    query: String,
}

pub struct WebSearchTool {
    client: TavilyClient,
    max_results: usize,
    chunks_per_source: usize,
}

impl WebSearchTool {
    pub fn new(client: TavilyClient, max_results: usize, chunks_per_source: usize) -> Self {
        Self {
            client,
            max_results,
            chunks_per_source,
        }
    }

    fn request_body(&self, query: &str) -> Value {
        json!({
            "query": query,
            "topic": "general",
            "search_depth": "advanced",
            "chunks_per_source": self.chunks_per_source,
            "max_results": self.max_results,
            "include_raw_content": false,
        })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Performs a web search and returns the top relevant results."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WebSearchArgs>()
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let args: WebSearchArgs = parse_args(args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }

        let result = self.client.post("search", &self.request_body(query)).await?;
        let count = result
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if count == 0 {
            tracing::info!(query = %query, "web search returned no results");
            return Ok(json!([]));
        }
        tracing::info!(query = %query, count, "web search results");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_uses_configured_limits() {
        let tool = WebSearchTool::new(TavilyClient::new(None, "key", 5), 7, 2);
        let body = tool.request_body("rust async");
        assert_eq!(body["query"], "rust async");
        assert_eq!(body["max_results"], 7);
        assert_eq!(body["chunks_per_source"], 2);
        assert_eq!(body["include_raw_content"], false);
    }

    #[test]
    fn test_catalog_entry_requires_query() {
        let tool = WebSearchTool::new(TavilyClient::new(None, "key", 5), 5, 3);
        let entry = tool.catalog_entry();
        assert_eq!(entry.name, "web_search");
        let query = &entry.parameters["query"];
        assert!(query.required);
        assert_eq!(query.kind, "string");
        assert!(query.description.contains("search query"));
    }

    #[tokio::test]
    async fn test_blank_query_rejected_without_network() {
        let tool = WebSearchTool::new(TavilyClient::new(Some("http://127.0.0.1:9"), "key", 1), 5, 3);
        let mut args = Map::new();
        args.insert("query".into(), json!("   "));
        let err = tool.invoke(&args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
