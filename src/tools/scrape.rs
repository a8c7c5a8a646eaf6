//! web_scrap 工具：通过 Tavily extract API 抓取网页正文
//!
//! 每条结果的 raw_content 先做清洗（HTML 用 html2text 提取可读文本），清洗失败时明确回退为原始内容；
//! 超过 max_result_chars 时截断并追加 ...[truncated]。

use async_trait::async_trait;
use html2text::from_read;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::registry::{parse_args, schema_of};
use crate::tools::tavily::TavilyClient;
use crate::tools::{Tool, ToolError};

#[derive(Deserialize, JsonSchema)]
struct WebScrapArgs {
    /// The URL of the webpage to scrape.
    url: String,
}

pub struct WebScrapTool {
    client: TavilyClient,
    max_result_chars: usize,
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.contains('<') && (s.contains("</") || s.contains("<meta") || s.contains("<head")))
}

/// 清洗后的正文；失败时由调用方回退到原始内容
fn clean_content(raw: &str) -> Result<String, String> {
    let raw = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);
    let text = if looks_like_html(raw) {
        from_read(raw.as_bytes(), 120).map_err(|e| e.to_string())?
    } else {
        raw.to_string()
    };
    let text = text.trim();
    if text.is_empty() {
        return Err("no readable text".to_string());
    }
    Ok(text.to_string())
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

/// 就地替换每条结果的 raw_content
fn clean_extraction(mut payload: Value, max_chars: usize) -> Value {
    if let Some(results) = payload.get_mut("results").and_then(Value::as_array_mut) {
        for result in results {
            let Some(raw) = result.get("raw_content").and_then(Value::as_str) else {
                continue;
            };
            let content = match clean_content(raw) {
                Ok(text) => text,
                Err(reason) => {
                    tracing::debug!(reason = %reason, "content cleaning failed; keeping raw payload");
                    raw.to_string()
                }
            };
            result["raw_content"] = Value::String(truncate(content, max_chars));
        }
    }
    payload
}

impl WebScrapTool {
    pub fn new(client: TavilyClient, max_result_chars: usize) -> Self {
        Self {
            client,
            max_result_chars,
        }
    }
}

#[async_trait]
impl Tool for WebScrapTool {
    fn name(&self) -> &str {
        "web_scrap"
    }

    fn description(&self) -> &str {
        "Scrapes a webpage and returns its extracted, readable content."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WebScrapArgs>()
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let args: WebScrapArgs = parse_args(args)?;
        let url = args.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!("not an http(s) url: {url}")));
        }

        let body = json!({
            "urls": url,
            "extract_depth": "advanced",
            "include_images": false,
            "include_favicon": false,
        });
        let payload = self.client.post("extract", &body).await?;
        let has_results = payload
            .get("results")
            .and_then(Value::as_array)
            .is_some_and(|r| !r.is_empty());
        if !has_results {
            tracing::info!(url = %url, "web extract returned nothing");
            return Ok(json!([]));
        }
        Ok(clean_extraction(payload, self.max_result_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_is_cleaned() {
        let cleaned = clean_content("<html><body><h1>Title</h1><p>Hello world</p></body></html>").unwrap();
        assert!(cleaned.contains("Hello world"));
        assert!(!cleaned.contains("<p>"));
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(clean_content("  just text \n").unwrap(), "just text");
        assert!(clean_content("   ").is_err());
    }

    #[test]
    fn test_extraction_falls_back_to_raw_and_truncates() {
        let payload = json!({
            "results": [
                {"url": "https://a", "raw_content": "   "},
                {"url": "https://b", "raw_content": "abcdefghij"},
                {"url": "https://c"}
            ]
        });
        let cleaned = clean_extraction(payload, 4);
        assert_eq!(cleaned["results"][0]["raw_content"], "   ");
        assert_eq!(cleaned["results"][1]["raw_content"], "abcd\n...[truncated]");
        assert!(cleaned["results"][2].get("raw_content").is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let tool = WebScrapTool::new(TavilyClient::new(Some("http://127.0.0.1:9"), "key", 1), 100);
        let mut args = Map::new();
        args.insert("url".into(), json!("file:///etc/passwd"));
        assert!(matches!(
            tool.invoke(&args).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
