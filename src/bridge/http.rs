use super::BridgeProvider;
use anyhow::{anyhow, Context};
use futures_core::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bridge reached by POSTing JSON-RPC requests to a single endpoint.
#[derive(Debug)]
pub struct HttpBridge {
    http: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpBridge {
    pub fn new(http: reqwest::Client, url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            url: Url::parse(url).with_context(|| format!("invalid bridge URL: {url}"))?,
            next_id: AtomicU64::new(1),
        })
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h
    }

    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let resp = self
            .http
            .post(self.url.clone())
            .headers(Self::headers())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach bridge at {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("bridge HTTP {status}: {text}"));
        }

        let v: Value = resp.json().await.context("bridge returned invalid JSON")?;
        if let Some(err) = v.get("error") {
            return Err(anyhow!(
                "MCP error {}: {}",
                err.get("code").and_then(Value::as_i64).unwrap_or(0),
                err.get("message").and_then(Value::as_str).unwrap_or("unknown error")
            ));
        }
        v.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("bridge response has neither result nor error"))
    }
}

impl BridgeProvider for HttpBridge {
    fn list_tools(&self) -> BoxFuture<'_, anyhow::Result<Vec<Value>>> {
        Box::pin(async move {
            let result = self.request("tools/list", json!({})).await?;
            match result.get("tools") {
                Some(Value::Array(tools)) => Ok(tools.clone()),
                _ => Err(anyhow!("tools/list result has no tools array")),
            }
        })
    }

    fn call_tool<'a>(&'a self, name: &'a str, arguments: Value) -> BoxFuture<'a, anyhow::Result<Value>> {
        Box::pin(async move {
            self.request("tools/call", json!({ "name": name, "arguments": arguments }))
                .await
                .with_context(|| format!("tools/call {name} failed"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn lists_and_calls_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"tools": [{"name": "search", "inputSchema": {"type": "object"}}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call", "params": {"name": "search"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2,
                "result": {"content": [{"type": "text", "text": "found"}]}
            })))
            .mount(&server)
            .await;

        let bridge = HttpBridge::new(reqwest::Client::new(), &server.uri()).unwrap();
        let tools = bridge.list_tools().await.unwrap();
        assert_eq!(tools[0]["name"], json!("search"));
        let result = bridge.call_tool("search", json!({"q": "x"})).await.unwrap();
        assert_eq!(result["content"][0]["text"], json!("found"));
    }

    #[tokio::test]
    async fn remote_errors_and_http_failures_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "unknown tool"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let bridge = HttpBridge::new(reqwest::Client::new(), &server.uri()).unwrap();
        let err = bridge.call_tool("nope", json!({})).await.unwrap_err();
        assert!(format!("{err:#}").contains("unknown tool"));
        let err = bridge.list_tools().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
