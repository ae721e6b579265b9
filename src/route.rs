use futures_core::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn has_body(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => anyhow::bail!("unsupported HTTP method: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Header,
    Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "in", alias = "location")]
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reconstructed HTTP-style request handed to a route handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub method: HttpMethod,
    /// Route template, e.g. `/users/:id`.
    pub route_path: String,
    /// Template with path params substituted.
    pub path: String,
    pub body: Value,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub params: Map<String, Value>,
}

/// Response-capturing shim.
///
/// Status defaults to 200 when the handler never sets one. Writing data never
/// touches an explicitly chosen status.
#[derive(Debug, Clone, Default)]
pub struct RouteResponse {
    status: Option<u16>,
    data: Option<Value>,
    headers: Map<String, Value>,
}

impl RouteResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = Some(code);
        self
    }

    pub fn json(&mut self, data: Value) -> &mut Self {
        self.data = Some(data);
        self
    }

    pub fn send(&mut self, text: impl Into<String>) -> &mut Self {
        self.data = Some(Value::String(text.into()));
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    pub fn data(&self) -> &Value {
        self.data.as_ref().unwrap_or(&Value::Null)
    }

    pub fn headers(&self) -> &Map<String, Value> {
        &self.headers
    }
}

/// Capability every route handler provides.
pub trait RouteHandler: Send + Sync {
    fn process<'a>(
        &'a self,
        req: &'a RouteRequest,
        res: &'a mut RouteResponse,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    pub body_schema: Option<Value>,
    pub body_required: bool,
    pub response_schema: Option<Value>,
    pub tags: Vec<String>,
    pub handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl Route {
    pub fn new(method: HttpMethod, path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: None,
            description: None,
            parameters: Vec::new(),
            body_schema: None,
            body_required: false,
            response_schema: None,
            tags: Vec::new(),
            handler,
        }
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn with_body(mut self, schema: Value, required: bool) -> Self {
        self.body_schema = Some(schema);
        self.body_required = required;
        self
    }

    pub fn with_response(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// `:name` placeholders in declaration order.
    pub fn path_placeholders(&self) -> Vec<String> {
        path_placeholders(&self.path)
    }

    /// `METHOD /path`, used as the endpoint label in tool results.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

pub fn path_placeholders(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|seg| seg.strip_prefix(':'))
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Substitute `:name` segments with values from `params`.
///
/// Placeholders without a value are left as-is.
pub fn fill_path(path: &str, params: &Map<String, Value>) -> String {
    path.split('/')
        .map(|seg| {
            let Some(rest) = seg.strip_prefix(':') else {
                return seg.to_string();
            };
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            match params.get(&name) {
                Some(v) => format!("{}{}", scalar_text(v), &rest[name.len()..]),
                None => seg.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Query/header/path rendering of a JSON value.
pub fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Externally owned, refreshed route list. The core reads one snapshot per call.
pub trait RouteSource: Send + Sync {
    fn snapshot(&self) -> Arc<Vec<Route>>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    routes: Arc<Vec<Route>>,
}

impl StaticRoutes {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }
}

impl RouteSource for StaticRoutes {
    fn snapshot(&self) -> Arc<Vec<Route>> {
        self.routes.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed status/payload.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub seen: Mutex<Vec<RouteRequest>>,
        pub status: Option<u16>,
        pub reply: Option<Value>,
    }

    impl RecordingHandler {
        pub fn replying(status: Option<u16>, reply: Value) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                status,
                reply: Some(reply),
            })
        }

        pub fn last(&self) -> Option<RouteRequest> {
            self.seen.lock().unwrap().last().cloned()
        }
    }

    impl RouteHandler for RecordingHandler {
        fn process<'a>(
            &'a self,
            req: &'a RouteRequest,
            res: &'a mut RouteResponse,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(req.clone());
                if let Some(code) = self.status {
                    res.status(code);
                }
                if let Some(reply) = &self.reply {
                    res.json(reply.clone());
                }
                Ok(())
            })
        }
    }

    pub struct FailingHandler;

    impl RouteHandler for FailingHandler {
        fn process<'a>(
            &'a self,
            _req: &'a RouteRequest,
            _res: &'a mut RouteResponse,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { anyhow::bail!("backend exploded") })
        }
    }

    pub struct PanickingHandler;

    impl RouteHandler for PanickingHandler {
        fn process<'a>(
            &'a self,
            _req: &'a RouteRequest,
            _res: &'a mut RouteResponse,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async {
                if true {
                    panic!("handler bug");
                }
                Ok(())
            })
        }
    }
}
