//! Tool-call execution: local route reconstruction and bridge name resolution.

use crate::bridge::{BridgeEntry, BridgeSet};
use crate::catalog::{self, CatalogHint};
use crate::error::{GatewayError, Result};
use crate::route::{self, ParamLocation, Route, RouteRequest, RouteResponse};
use crate::schema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Canonical `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({"type": "text", "text": text.into()})],
            is_error: None,
        }
    }

    /// Text of the first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
    }

    /// Accepts any remote result that carries a `content` array.
    fn from_bridge(raw: Value) -> Option<Self> {
        let Value::Object(mut obj) = raw else {
            return None;
        };
        let Some(Value::Array(content)) = obj.remove("content") else {
            return None;
        };
        let is_error = obj.get("isError").and_then(Value::as_bool);
        Some(Self { content, is_error })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub bridge_list: Duration,
    pub bridge_call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            bridge_list: DEFAULT_LIST_TIMEOUT,
            bridge_call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Read-only inputs for one call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub routes: &'a [Route],
    pub bridges: &'a BridgeSet,
    pub hint: Option<&'a CatalogHint>,
    pub timeouts: Timeouts,
}

/// One way of guessing a bridge's name for a tool.
///
/// Bridges are versioned independently and prefix inconsistently, so the
/// dispatcher walks these in order after the catalog-recorded name fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStrategy {
    Bare,
    ServerPrefixed,
    McpPrefixed,
    ServerSuffixed,
}

impl CandidateStrategy {
    pub const LADDER: [CandidateStrategy; 4] = [
        CandidateStrategy::Bare,
        CandidateStrategy::ServerPrefixed,
        CandidateStrategy::McpPrefixed,
        CandidateStrategy::ServerSuffixed,
    ];

    pub fn candidate(self, server: &str, name: &str) -> String {
        match self {
            CandidateStrategy::Bare => name.to_string(),
            CandidateStrategy::ServerPrefixed => format!("{server}_{name}"),
            CandidateStrategy::McpPrefixed => format!("mcp_{name}"),
            CandidateStrategy::ServerSuffixed => format!("{name}_{server}"),
        }
    }
}

/// Fallback names for `name` on `server`, in ladder order, deduplicated.
pub fn ladder_candidates(server: &str, name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(CandidateStrategy::LADDER.len());
    for strategy in CandidateStrategy::LADDER {
        let candidate = strategy.candidate(server, name);
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

pub async fn call(name: &str, args: &Map<String, Value>, ctx: CallContext<'_>) -> Result<ToolResult> {
    if let Some(route) = ctx
        .routes
        .iter()
        .find(|r| catalog::tool_name_for_route(r) == name)
    {
        return call_local(name, route, args).await;
    }

    if let Some(result) = call_bridges(name, args, &ctx).await {
        return Ok(result);
    }

    Err(GatewayError::ToolNotFound(name.to_string()))
}

/// Rebuild the nested HTTP-style request for `route` from flat arguments.
pub fn reconstruct_request(route: &Route, args: &Map<String, Value>) -> RouteRequest {
    let mut query = Map::new();
    let mut headers = Map::new();
    let mut params = Map::new();

    for spec in &route.parameters {
        let Some(value) = args.get(&spec.name) else {
            continue;
        };
        let bucket = match spec.location {
            ParamLocation::Query => &mut query,
            ParamLocation::Header => &mut headers,
            ParamLocation::Path => &mut params,
        };
        bucket.insert(spec.name.clone(), value.clone());
    }

    let claimed: Vec<&str> = route.parameters.iter().map(|p| p.name.as_str()).collect();
    let body = match route.body_schema.as_ref().map(schema::normalize) {
        Some(body_schema) if schema::is_structured_object(&body_schema) => {
            Value::Object(rebuild_body(&body_schema, args, &claimed))
        }
        _ if claimed.contains(&"body") => Value::Object(Map::new()),
        _ => unstructured_body(args),
    };

    for placeholder in route.path_placeholders() {
        if params.contains_key(&placeholder) {
            continue;
        }
        if let Some(value) = args.get(&placeholder) {
            params.insert(placeholder, value.clone());
        }
    }

    RouteRequest {
        method: route.method,
        route_path: route.path.clone(),
        path: route::fill_path(&route.path, &params),
        body,
        query,
        headers,
        params,
    }
}

/// Keys in `claimed` belong to declared parameters and never reach the body.
fn rebuild_body(body_schema: &Value, args: &Map<String, Value>, claimed: &[&str]) -> Map<String, Value> {
    let mut body = Map::new();
    let Some(props) = body_schema.get("properties").and_then(Value::as_object) else {
        return body;
    };

    for (name, prop) in props {
        if schema::is_structured_object(prop) {
            // Callers that already send the nested object get it as the base.
            let mut nested = match args.get(name) {
                Some(Value::Object(direct)) if !claimed.contains(&name.as_str()) => direct.clone(),
                _ => Map::new(),
            };
            let mut found = !nested.is_empty();
            if let Some(children) = prop.get("properties").and_then(Value::as_object) {
                for child in children.keys() {
                    let key = schema::dotted_key(name, child);
                    if claimed.contains(&key.as_str()) {
                        continue;
                    }
                    if let Some(value) = args.get(&key) {
                        nested.insert(child.clone(), value.clone());
                        found = true;
                    }
                }
            }
            if found {
                body.insert(name.clone(), Value::Object(nested));
            }
        } else if claimed.contains(&name.as_str()) {
            continue;
        } else if let Some(value) = args.get(name) {
            body.insert(name.clone(), value.clone());
        }
    }
    body
}

fn unstructured_body(args: &Map<String, Value>) -> Value {
    match args.get("body") {
        Some(v @ (Value::Object(_) | Value::Array(_))) => v.clone(),
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(scalar) => json!({ "value": scalar }),
    }
}

async fn call_local(name: &str, route: &Route, args: &Map<String, Value>) -> Result<ToolResult> {
    let req = reconstruct_request(route, args);
    debug!(tool = name, endpoint = %route.endpoint(), "invoking local route");

    let handler = route.handler.clone();
    // Run on its own task so a panicking handler is reported, not propagated.
    let joined = tokio::spawn(async move {
        let mut res = RouteResponse::new();
        handler.process(&req, &mut res).await.map(|()| res)
    })
    .await;

    let res = match joined {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => {
            return Err(GatewayError::HandlerExecution {
                tool: name.to_string(),
                source: e,
            })
        }
        Err(join) => {
            return Err(GatewayError::HandlerExecution {
                tool: name.to_string(),
                source: anyhow::anyhow!("handler task failed: {join}"),
            })
        }
    };

    let summary = json!({
        "success": true,
        "statusCode": res.status_code(),
        "data": res.data(),
        "endpoint": route.endpoint(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    let text = serde_json::to_string_pretty(&summary).map_err(anyhow::Error::from)?;
    Ok(ToolResult::text(text))
}

async fn call_bridges(name: &str, args: &Map<String, Value>, ctx: &CallContext<'_>) -> Option<ToolResult> {
    if ctx.bridges.is_empty() {
        return None;
    }
    let arguments = Value::Object(args.clone());

    let hinted = ctx.hint.and_then(|h| h.lookup(name));
    if let Some((server, original)) = hinted {
        if let Some(bridge) = ctx.bridges.get(server) {
            if let Some(result) = attempt(bridge, original, &arguments, ctx.timeouts.bridge_call).await {
                return Some(result);
            }
        }
    }

    for bridge in ctx.bridges.iter() {
        // Each (bridge, name) pair is called at most once per dispatch.
        let mut tried: Vec<String> = match hinted {
            Some((server, original)) if server == bridge.name => vec![original.to_string()],
            _ => Vec::new(),
        };

        match resolve_on_bridge(bridge, name, ctx.timeouts.bridge_list).await {
            Ok(Some(raw_name)) if tried.contains(&raw_name) => {
                debug!(bridge = %bridge.name, tool = %raw_name, "listed name already attempted; trying name variants");
            }
            Ok(Some(raw_name)) => {
                if let Some(result) = attempt(bridge, &raw_name, &arguments, ctx.timeouts.bridge_call).await {
                    return Some(result);
                }
                tried.push(raw_name);
            }
            Ok(None) => {
                debug!(bridge = %bridge.name, tool = name, "tool not listed; trying name variants");
            }
            Err(e) => {
                debug!(bridge = %bridge.name, error = %format!("{e:#}"), "tool lookup failed; trying name variants");
            }
        }

        for candidate in ladder_candidates(&bridge.name, name) {
            if tried.contains(&candidate) {
                continue;
            }
            if let Some(result) = attempt(bridge, &candidate, &arguments, ctx.timeouts.bridge_call).await {
                return Some(result);
            }
            tried.push(candidate);
        }
    }

    None
}

/// Raw bridge name whose cleaned form equals `name`.
async fn resolve_on_bridge(bridge: &BridgeEntry, name: &str, list_timeout: Duration) -> anyhow::Result<Option<String>> {
    let tools = catalog::list_bridge_tools(bridge, list_timeout).await?;
    Ok(tools
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .find(|raw| bridge.prefixes.clean(raw) == name)
        .map(str::to_string))
}

/// One bounded call. Every failure is logged and swallowed.
async fn attempt(bridge: &BridgeEntry, candidate: &str, arguments: &Value, call_timeout: Duration) -> Option<ToolResult> {
    let outcome = tokio::time::timeout(call_timeout, bridge.provider.call_tool(candidate, arguments.clone())).await;
    match outcome {
        Ok(Ok(raw)) => match ToolResult::from_bridge(raw) {
            Some(result) => {
                info!(bridge = %bridge.name, tool = candidate, "bridge call succeeded");
                Some(result)
            }
            None => {
                warn!(bridge = %bridge.name, tool = candidate, "bridge result has no content");
                None
            }
        },
        Ok(Err(e)) => {
            warn!(bridge = %bridge.name, tool = candidate, error = %format!("{e:#}"), "bridge call failed");
            None
        }
        Err(_) => {
            warn!(
                bridge = %bridge.name,
                tool = candidate,
                timeout_ms = call_timeout.as_millis() as u64,
                "bridge call timed out"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::FakeBridge;
    use crate::bridge::PrefixRules;
    use crate::catalog::build_tools_list;
    use crate::route::testing::{FailingHandler, PanickingHandler, RecordingHandler};
    use crate::route::{HttpMethod, ParameterSpec};
    use std::sync::Arc;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn ctx<'a>(routes: &'a [Route], bridges: &'a BridgeSet) -> CallContext<'a> {
        CallContext {
            routes,
            bridges,
            hint: None,
            timeouts: Timeouts::default(),
        }
    }

    fn summary(result: &ToolResult) -> Value {
        serde_json::from_str(result.first_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn dotted_arguments_rebuild_nested_body() {
        let handler = RecordingHandler::replying(Some(201), json!({"created": true}));
        let routes = vec![Route::new(HttpMethod::Post, "/orders", handler.clone()).with_body(
            json!({
                "type": "object",
                "properties": {
                    "product": {"type": "object", "properties": {"id": {"type": "string"}, "qty": {"type": "integer"}}},
                    "coupon": {"type": "object", "properties": {"code": {"type": "string"}}}
                }
            }),
            true,
        )];
        let bridges = BridgeSet::new();

        let result = call(
            "api__orders_post",
            &args(json!({"product.id": "A1", "product.qty": 3})),
            ctx(&routes, &bridges),
        )
        .await
        .unwrap();

        let seen = handler.last().unwrap();
        assert_eq!(seen.body, json!({"product": {"id": "A1", "qty": 3}}));
        let s = summary(&result);
        assert_eq!(s["statusCode"], json!(201));
        assert_eq!(s["data"], json!({"created": true}));
        assert_eq!(s["success"], json!(true));
        assert_eq!(s["endpoint"], json!("POST /orders"));
        assert!(s["timestamp"].is_string());
    }

    #[tokio::test]
    async fn parameters_land_in_their_buckets() {
        let handler = RecordingHandler::replying(None, json!([]));
        let routes = vec![Route::new(HttpMethod::Get, "/users/:id/posts", handler.clone())
            .with_parameter(ParameterSpec {
                name: "active".into(),
                location: ParamLocation::Query,
                required: false,
                schema: Some(json!({"type": "boolean"})),
                description: None,
            })
            .with_parameter(ParameterSpec {
                name: "x-trace".into(),
                location: ParamLocation::Header,
                required: false,
                schema: None,
                description: None,
            })];
        let bridges = BridgeSet::new();

        let result = call(
            "api__users__id_posts_get",
            &args(json!({"active": true, "x-trace": "t1", "id": 42, "ignored": 1})),
            ctx(&routes, &bridges),
        )
        .await
        .unwrap();

        let seen = handler.last().unwrap();
        assert_eq!(seen.query, args(json!({"active": true})));
        assert_eq!(seen.headers, args(json!({"x-trace": "t1"})));
        assert_eq!(seen.params, args(json!({"id": 42})));
        assert_eq!(seen.path, "/users/42/posts");
        assert_eq!(seen.body, json!({}));
        assert_eq!(summary(&result)["statusCode"], json!(200));
    }

    #[test]
    fn unstructured_body_uses_literal_body_argument() {
        let route = Route::new(HttpMethod::Put, "/blob", RecordingHandler::replying(None, json!(null)))
            .with_body(json!({"type": "array", "items": {"type": "integer"}}), true);
        assert_eq!(reconstruct_request(&route, &args(json!({"body": [1, 2]}))).body, json!([1, 2]));
        assert_eq!(
            reconstruct_request(&route, &args(json!({"body": "raw"}))).body,
            json!({"value": "raw"})
        );

        let free = Route::new(HttpMethod::Post, "/free", RecordingHandler::replying(None, json!(null)));
        assert_eq!(
            reconstruct_request(&free, &args(json!({"body": {"a": 1}}))).body,
            json!({"a": 1})
        );
    }

    #[test]
    fn parameter_named_like_a_body_key_stays_out_of_the_body() {
        let route = Route::new(HttpMethod::Post, "/items", RecordingHandler::replying(None, json!(null)))
            .with_parameter(ParameterSpec {
                name: "limit".into(),
                location: ParamLocation::Query,
                required: false,
                schema: None,
                description: None,
            })
            .with_body(
                json!({"type": "object", "properties": {"limit": {"type": "string"}, "name": {"type": "string"}}}),
                false,
            );
        let req = reconstruct_request(&route, &args(json!({"limit": 5, "name": "n"})));
        assert_eq!(req.query, args(json!({"limit": 5})));
        assert_eq!(req.body, json!({"name": "n"}));
    }

    #[test]
    fn parent_is_omitted_without_children() {
        let route = Route::new(HttpMethod::Post, "/o", RecordingHandler::replying(None, json!(null))).with_body(
            json!({"type": "object", "properties": {
                "product": {"type": "object", "properties": {"id": {"type": "string"}}},
                "note": {"type": "string"}
            }}),
            false,
        );
        let req = reconstruct_request(&route, &args(json!({"note": "hi"})));
        assert_eq!(req.body, json!({"note": "hi"}));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_are_reported() {
        let routes = vec![
            Route::new(HttpMethod::Get, "/boom", Arc::new(FailingHandler)),
            Route::new(HttpMethod::Get, "/panic", Arc::new(PanickingHandler)),
        ];
        let bridges = BridgeSet::new();

        let err = call("api__boom_get", &Map::new(), ctx(&routes, &bridges)).await.unwrap_err();
        assert!(matches!(err, GatewayError::HandlerExecution { .. }));
        assert!(err.to_string().contains("backend exploded"));

        let err = call("api__panic_get", &Map::new(), ctx(&routes, &bridges)).await.unwrap_err();
        assert!(matches!(err, GatewayError::HandlerExecution { .. }));
    }

    #[tokio::test]
    async fn listed_prefixed_name_is_called_for_clean_name() {
        let chrome = Arc::new(FakeBridge::with_tools(&["chrome_new_page"]));
        let mut bridges = BridgeSet::new();
        bridges.insert("chrome", chrome.clone());

        let result = call("new_page", &args(json!({"url": "about:blank"})), ctx(&[], &bridges))
            .await
            .unwrap();

        assert_eq!(chrome.calls(), vec!["chrome_new_page".to_string()]);
        assert!(result.first_text().unwrap().starts_with("chrome_new_page"));
    }

    #[tokio::test]
    async fn catalog_hint_is_tried_first_without_listing() {
        let chrome = Arc::new(FakeBridge::with_tools(&["chrome_new_page"]));
        let mut bridges = BridgeSet::new();
        bridges.insert("chrome", chrome.clone());
        let tools = build_tools_list(&[], &bridges, DEFAULT_LIST_TIMEOUT).await;
        let hint = CatalogHint::from_tools(&tools);
        assert_eq!(chrome.list_count(), 1);

        let mut c = ctx(&[], &bridges);
        c.hint = Some(&hint);
        call("new_page", &Map::new(), c).await.unwrap();

        assert_eq!(chrome.list_count(), 1);
        assert_eq!(chrome.calls(), vec!["chrome_new_page".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_hinted_name_is_not_called_again() {
        let chrome = Arc::new(FakeBridge {
            call_delay: Some(Duration::from_secs(30)),
            ..FakeBridge::with_tools(&["chrome_new_page"])
        });
        let mut bridges = BridgeSet::new();
        bridges.insert("chrome", chrome.clone());
        let tools = build_tools_list(&[], &bridges, DEFAULT_LIST_TIMEOUT).await;
        let hint = CatalogHint::from_tools(&tools);

        let mut c = ctx(&[], &bridges);
        c.hint = Some(&hint);
        let err = call("new_page", &Map::new(), c).await.unwrap_err();

        assert!(matches!(err, GatewayError::ToolNotFound(_)));
        assert_eq!(
            chrome.calls(),
            vec!["chrome_new_page".to_string(), "new_page".to_string(), "mcp_new_page".to_string(), "new_page_chrome".to_string()]
        );
    }

    #[tokio::test]
    async fn ladder_is_used_when_listing_fails() {
        let bridge = Arc::new(FakeBridge {
            list_fails: true,
            accepts: vec!["mcp_search".into()],
            ..FakeBridge::default()
        });
        let mut bridges = BridgeSet::new();
        bridges.insert_with_prefixes("docs", PrefixRules::default(), bridge.clone());

        call("search", &Map::new(), ctx(&[], &bridges)).await.unwrap();
        assert_eq!(
            bridge.calls(),
            vec!["search".to_string(), "docs_search".to_string(), "mcp_search".to_string()]
        );
    }

    #[tokio::test]
    async fn results_without_content_do_not_count() {
        let first = Arc::new(FakeBridge {
            reply_without_content: true,
            ..FakeBridge::with_tools(&["lookup"])
        });
        let second = Arc::new(FakeBridge::with_tools(&["lookup"]));
        let mut bridges = BridgeSet::new();
        bridges.insert("first", first.clone());
        bridges.insert("second", second.clone());

        let result = call("lookup", &Map::new(), ctx(&[], &bridges)).await.unwrap();
        assert!(result.first_text().unwrap().starts_with("lookup"));
        assert_eq!(second.calls(), vec!["lookup".to_string()]);
        assert!(!first.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bridges_yield_tool_not_found() {
        let slow = Arc::new(FakeBridge {
            call_delay: Some(Duration::from_secs(30)),
            list_delay: Some(Duration::from_secs(30)),
            accepts: vec!["x".into()],
            ..FakeBridge::default()
        });
        let broken = Arc::new(FakeBridge {
            list_fails: true,
            ..FakeBridge::default()
        });
        let mut bridges = BridgeSet::new();
        bridges.insert("slow", slow.clone());
        bridges.insert("broken", broken.clone());

        let err = call("x", &Map::new(), ctx(&[], &bridges)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ToolNotFound(ref n) if n == "x"));
        assert_eq!(slow.calls().len(), 4);
        assert_eq!(broken.calls().len(), 4);
    }

    #[tokio::test]
    async fn unknown_tool_without_bridges_is_not_found() {
        let err = call("nope", &Map::new(), ctx(&[], &BridgeSet::new())).await.unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn ladder_order_and_dedup() {
        assert_eq!(
            ladder_candidates("chrome", "new_page"),
            vec!["new_page", "chrome_new_page", "mcp_new_page", "new_page_chrome"]
        );
        assert_eq!(ladder_candidates("mcp", "x"), vec!["x", "mcp_x", "x_mcp"]);
    }
}
