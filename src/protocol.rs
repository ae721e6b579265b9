//! JSON-RPC 2.0 method router for the MCP surface.
//!
//! The router owns no mutable state between calls. Routes and bridges are
//! snapshotted from their sources on every request; the only per-connection
//! memory is the caller-owned [`SessionState`].

use crate::bridge::BridgeSource;
use crate::catalog::{self, CatalogHint};
use crate::dispatch::{self, CallContext, Timeouts};
use crate::error::{GatewayError, Result, INVALID_REQUEST};
use crate::metrics::{RequestCounters, RequestTracker};
use crate::route::RouteSource;
use crate::store::{ContentCache, MemoryStore, NoCache, PromptStore, ResourceStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const JSONRPC_VERSION: &str = "2.0";
const GENERIC_INTERNAL_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Every method the router answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ToolsList,
    ToolsCall,
    PromptsList,
    PromptsGet,
    ResourcesList,
    ResourcesRead,
    ResourcesTemplatesList,
    Ping,
    CacheStats,
    CacheClear,
    Health,
    Metrics,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "initialize" => Method::Initialize,
            "tools/list" => Method::ToolsList,
            "tools/call" => Method::ToolsCall,
            "prompts/list" => Method::PromptsList,
            "prompts/get" => Method::PromptsGet,
            "resources/list" => Method::ResourcesList,
            "resources/read" => Method::ResourcesRead,
            "resources/templates/list" => Method::ResourcesTemplatesList,
            "ping" => Method::Ping,
            "cache/stats" => Method::CacheStats,
            "cache/clear" => Method::CacheClear,
            "health" => Method::Health,
            "metrics" => Method::Metrics,
            _ => return None,
        })
    }

    /// Metrics bucket.
    pub fn domain(self) -> &'static str {
        match self {
            Method::ToolsList | Method::ToolsCall => "tools",
            Method::PromptsList | Method::PromptsGet => "prompts",
            Method::ResourcesList | Method::ResourcesRead | Method::ResourcesTemplatesList => "resources",
            Method::CacheStats | Method::CacheClear => "cache",
            Method::Initialize | Method::Ping | Method::Health | Method::Metrics => "system",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub server_name: String,
    /// When off, internal failures surface as a bare "Internal Server Error".
    pub enable_detailed_errors: bool,
    pub timeouts: Timeouts,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            server_name: env!("CARGO_PKG_NAME").to_string(),
            enable_detailed_errors: true,
            timeouts: Timeouts::default(),
        }
    }
}

/// Per-connection state owned by the transport.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Bridge routing from this connection's latest `tools/list`.
    pub catalog: Option<CatalogHint>,
    pub initialized: bool,
}

pub struct ProtocolRouter {
    routes: Arc<dyn RouteSource>,
    bridges: Arc<dyn BridgeSource>,
    prompts: Arc<dyn PromptStore>,
    resources: Arc<dyn ResourceStore>,
    cache: Arc<dyn ContentCache>,
    tracker: Arc<dyn RequestTracker>,
    options: RouterOptions,
    started: Instant,
}

impl ProtocolRouter {
    pub fn new(routes: Arc<dyn RouteSource>, bridges: Arc<dyn BridgeSource>) -> Self {
        let empty = Arc::new(MemoryStore::default());
        Self {
            routes,
            bridges,
            prompts: empty.clone(),
            resources: empty,
            cache: Arc::new(NoCache),
            tracker: Arc::new(RequestCounters::new()),
            options: RouterOptions::default(),
            started: Instant::now(),
        }
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptStore>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceStore>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn RequestTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Handle one decoded transport message (single request or batch).
    ///
    /// Returns `None` when nothing should be written back (notifications).
    pub async fn handle_message(&self, incoming: Value, session: &mut SessionState) -> Option<Value> {
        match incoming {
            Value::Array(batch) => {
                if batch.is_empty() {
                    return Some(invalid_request(Value::Null, "batch request must not be empty").to_value());
                }
                let mut responses = Vec::with_capacity(batch.len());
                for item in batch {
                    if let Some(resp) = self.handle_single(item, session).await {
                        responses.push(resp.to_value());
                    }
                }
                (!responses.is_empty()).then_some(Value::Array(responses))
            }
            single => self.handle_single(single, session).await.map(|r| r.to_value()),
        }
    }

    async fn handle_single(&self, incoming: Value, session: &mut SessionState) -> Option<JsonRpcResponse> {
        let Value::Object(obj) = incoming else {
            return Some(invalid_request(Value::Null, "request must be a JSON object"));
        };
        let id = obj.get("id").cloned();
        // Only an absent `id` member makes a notification; `"id": null` is answered.
        let is_notification = !obj.contains_key("id");

        let req: JsonRpcRequest = match serde_json::from_value(Value::Object(obj)) {
            Ok(req) => req,
            Err(e) => {
                return Some(invalid_request(id.unwrap_or(Value::Null), &format!("malformed request: {e}")));
            }
        };
        if req.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            return Some(invalid_request(id.unwrap_or(Value::Null), "jsonrpc must be '2.0'"));
        }

        if is_notification {
            if req.method == "notifications/initialized" {
                session.initialized = true;
            }
            debug!(method = %req.method, "notification ignored");
            return None;
        }

        Some(self.process_request(req, session).await)
    }

    /// Route one request to its domain handler and wrap the outcome.
    pub async fn process_request(&self, req: JsonRpcRequest, session: &mut SessionState) -> JsonRpcResponse {
        let started = Instant::now();
        let id = req.id.clone().unwrap_or(Value::Null);

        let Some(method) = Method::parse(&req.method) else {
            let err = GatewayError::MethodNotFound(req.method.clone());
            self.tracker.track_request("unknown", started, false, Some(err.kind()));
            return JsonRpcResponse::failure(id, self.rpc_error(&err, &req.method));
        };

        match self.dispatch(method, req.params, session).await {
            Ok(result) => {
                self.tracker.track_request(method.domain(), started, true, None);
                JsonRpcResponse::success(id, result)
            }
            Err(err) => {
                if err.is_internal() {
                    warn!(method = %req.method, error = %err, "request failed");
                } else {
                    debug!(method = %req.method, error = %err, "request rejected");
                }
                self.tracker.track_request(method.domain(), started, false, Some(err.kind()));
                JsonRpcResponse::failure(id, self.rpc_error(&err, &req.method))
            }
        }
    }

    async fn dispatch(&self, method: Method, params: Value, session: &mut SessionState) -> Result<Value> {
        match method {
            Method::Initialize => Ok(self.initialize_payload()),
            Method::ToolsList => {
                let routes = self.routes.snapshot();
                let bridges = self.bridges.snapshot();
                let tools =
                    catalog::build_tools_list(&routes, &bridges, self.options.timeouts.bridge_list).await;
                session.catalog = Some(CatalogHint::from_tools(&tools));
                Ok(json!({ "tools": tools }))
            }
            Method::ToolsCall => self.tools_call(params, session).await,
            Method::PromptsList => Ok(json!({ "prompts": self.prompts.list() })),
            Method::PromptsGet => self.prompts_get(params),
            Method::ResourcesList => Ok(json!({ "resources": self.resources.list() })),
            Method::ResourcesRead => self.resources_read(params),
            Method::ResourcesTemplatesList => Ok(json!({ "resourceTemplates": self.resources.templates() })),
            Method::Ping => Ok(json!({ "type": "pong" })),
            Method::CacheStats => Ok(self.cache.stats()),
            Method::CacheClear => Ok(self.cache.clear()),
            Method::Health => Ok(json!({
                "status": "healthy",
                "server": self.options.server_name,
                "uptimeSecs": self.started.elapsed().as_secs(),
                "routes": self.routes.snapshot().len(),
                "bridges": self.bridges.snapshot().len(),
            })),
            Method::Metrics => Ok(self.tracker.snapshot()),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "listChanged": false, "subscribe": false }
            },
            "serverInfo": {
                "name": self.options.server_name,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn tools_call(&self, params: Value, session: &SessionState) -> Result<Value> {
        let params = object_params(params, "tools/call")?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidParams("tools/call requires string field 'name'".into()))?;
        let args = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(GatewayError::InvalidParams(
                    "tools/call 'arguments' must be an object".into(),
                ))
            }
        };

        let routes = self.routes.snapshot();
        let bridges = self.bridges.snapshot();
        let ctx = CallContext {
            routes: &routes,
            bridges: &bridges,
            hint: session.catalog.as_ref(),
            timeouts: self.options.timeouts,
        };
        let result = dispatch::call(name, &args, ctx).await?;
        serde_json::to_value(result).map_err(|e| GatewayError::Internal(e.into()))
    }

    fn prompts_get(&self, params: Value) -> Result<Value> {
        let params = object_params(params, "prompts/get")?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidParams("prompts/get requires string field 'name'".into()))?;
        let args = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| GatewayError::PromptNotFound(name.to_string()))?;
        let text = self
            .prompts
            .render(name, &args)
            .ok_or_else(|| GatewayError::PromptNotFound(name.to_string()))?;

        Ok(json!({
            "description": prompt.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        }))
    }

    fn resources_read(&self, params: Value) -> Result<Value> {
        let params = object_params(params, "resources/read")?;
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidParams("resources/read requires string field 'uri'".into()))?;
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| GatewayError::ResourceNotFound(uri.to_string()))?;
        Ok(json!({
            "contents": [{
                "uri": resource.uri,
                "mimeType": resource.mime_type,
                "text": resource.text
            }]
        }))
    }

    fn rpc_error(&self, err: &GatewayError, method: &str) -> RpcError {
        if !err.is_internal() {
            return RpcError {
                code: err.code(),
                message: err.to_string(),
                data: None,
            };
        }
        if !self.options.enable_detailed_errors {
            return RpcError {
                code: err.code(),
                message: GENERIC_INTERNAL_MESSAGE.to_string(),
                data: None,
            };
        }
        RpcError {
            code: err.code(),
            message: err.to_string(),
            data: Some(json!({
                "type": err.kind(),
                "method": method,
                "causes": error_chain(err),
            })),
        }
    }
}

fn object_params(params: Value, method: &str) -> Result<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(GatewayError::InvalidParams(format!("{method} params must be an object"))),
    }
}

fn error_chain(err: &GatewayError) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(e) = cur {
        out.push(e.to_string());
        cur = e.source();
    }
    out
}

fn invalid_request(id: Value, message: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        RpcError {
            code: INVALID_REQUEST,
            message: format!("Invalid Request: {message}"),
            data: None,
        },
    )
}
