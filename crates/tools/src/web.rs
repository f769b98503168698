//! Web fetch and web search tools. Unsandboxed by design — path
//! containment doesn't apply to network access, so both are offered to
//! manager and worker roles alike.

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{ToolContext, ToolRole};
use crate::registry::Tool;

const WORKER_AND_MANAGER: &[ToolRole] = &[ToolRole::Manager, ToolRole::Worker];
const MAX_FETCH_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct WebFetchRequest {
    pub url: String,
}

pub struct WebFetchTool;

#[async_trait::async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }
    fn description(&self) -> &'static str {
        "Fetch a URL over HTTP(S) and return its body, truncated to 1MB."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, _ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: WebFetchRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
            return Err("url must start with http:// or https://".to_string());
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| format!("building http client failed: {e}"))?;
        let response = client.get(&req.url).send().await.map_err(|e| format!("fetch failed: {e}"))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| format!("reading body failed: {e}"))?;
        let truncated = bytes.len() > MAX_FETCH_BYTES;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_FETCH_BYTES)]).into_owned();

        Ok(json!({
            "url": req.url,
            "status": status,
            "content_type": content_type,
            "body": body,
            "truncated": truncated,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Clone, serde::Serialize)]
struct SearchResult {
    title: String,
    url: String,
}

pub struct WebSearchTool;

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }
    fn description(&self) -> &'static str {
        "Search the web and return a list of {title, url} results."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}, "max_results": {"type": "integer", "default": 5}},
            "required": ["query"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, _ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: WebSearchRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;

        let client = reqwest::Client::new();
        let response = client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", req.query.as_str())])
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0 (kory-agent)")
            .send()
            .await
            .map_err(|e| format!("search request failed: {e}"))?;

        let body = response.text().await.map_err(|e| format!("reading search results failed: {e}"))?;
        let results = parse_duckduckgo_results(&body, req.max_results);

        Ok(json!({"query": req.query, "results": results}))
    }
}

fn parse_duckduckgo_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    // The lite HTML endpoint renders each result as
    // `<a rel="nofollow" class="result__a" href="...">Title</a>`.
    let re = Regex::new(r#"class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap();
    let tag_re = Regex::new(r"<[^>]+>").unwrap();

    re.captures_iter(html)
        .take(max_results)
        .map(|caps| {
            let url = html_unescape(&caps[1]);
            let title = html_unescape(tag_re.replace_all(&caps[2], "").trim());
            SearchResult { title, url }
        })
        .collect()
}

fn html_unescape(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_anchors() {
        let html = r#"<a rel="nofollow" class="result__a" href="https://example.com">Example &amp; Co</a>"#;
        let results = parse_duckduckgo_results(html, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].title, "Example & Co");
    }

    #[test]
    fn caps_at_max_results() {
        let html = (0..10)
            .map(|i| format!(r#"<a class="result__a" href="https://x.com/{i}">r{i}</a>"#))
            .collect::<Vec<_>>()
            .join("\n");
        let results = parse_duckduckgo_results(&html, 3);
        assert_eq!(results.len(), 3);
    }
}
