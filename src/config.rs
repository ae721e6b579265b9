use crate::bridge::{BridgeSet, PrefixRules};
use crate::codec::Framing;
use crate::dispatch::Timeouts;
use crate::protocol::RouterOptions;
use crate::route::{HttpMethod, ParameterSpec, Route, RouteHandler};
use crate::store::{MemoryStore, Prompt, Resource, ResourceTemplate, RENDER_CACHE_CAPACITY};
use crate::upstream::{StaticHandler, UpstreamHandler};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DETAILED_ERRORS_ENV: &str = "ROUTEGATE_DETAILED_ERRORS";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Name reported by `initialize` and `health`.
    pub server_name: Option<String>,

    /// Expose error chains on internal failures (default: on).
    pub enable_detailed_errors: Option<bool>,

    pub timeouts: TimeoutsConfig,

    /// Rendered prompts kept for `cache/*`; 0 disables the cache.
    pub render_cache_capacity: Option<usize>,

    /// Target for routes whose handler kind is `upstream`.
    pub upstream: Option<UpstreamConfig>,

    pub routes: Vec<RouteConfig>,
    pub bridges: Vec<BridgeConfig>,
    pub prompts: Vec<Prompt>,
    pub resources: Vec<Resource>,
    pub resource_templates: Vec<ResourceTemplate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub bridge_list_secs: u64,
    pub bridge_call_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            bridge_list_secs: t.bridge_list.as_secs(),
            bridge_call_secs: t.bridge_call.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// HTTP verb, case-insensitive.
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub body_schema: Option<Value>,
    #[serde(default)]
    pub body_required: bool,
    #[serde(default)]
    pub response_schema: Option<Value>,
    #[serde(default)]
    pub handler: HandlerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandlerConfig {
    #[default]
    Upstream,
    Static {
        #[serde(default = "default_status")]
        status: u16,
        #[serde(default)]
        body: Value,
    },
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Replaces the built-in prefix rules for this bridge when set.
    #[serde(default)]
    pub strip_prefixes: Option<Vec<String>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        framing: Framing,
    },
    Http {
        url: String,
    },
}

impl TransportConfig {
    pub fn label(&self) -> String {
        match self {
            TransportConfig::Stdio { command, args, .. } => format!("stdio: {command} {args:?}"),
            TransportConfig::Http { url } => format!("http: {url}"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn router_options(&self) -> anyhow::Result<RouterOptions> {
        let defaults = RouterOptions::default();
        let detailed = match std::env::var(DETAILED_ERRORS_ENV) {
            Ok(v) => parse_flag(&v).with_context(|| format!("invalid {DETAILED_ERRORS_ENV}: {v}"))?,
            Err(_) => self.enable_detailed_errors.unwrap_or(defaults.enable_detailed_errors),
        };
        Ok(RouterOptions {
            server_name: self.server_name.clone().unwrap_or(defaults.server_name),
            enable_detailed_errors: detailed,
            timeouts: Timeouts {
                bridge_list: Duration::from_secs(self.timeouts.bridge_list_secs),
                bridge_call: Duration::from_secs(self.timeouts.bridge_call_secs),
            },
        })
    }

    pub fn build_routes(&self, http: &reqwest::Client) -> anyhow::Result<Vec<Route>> {
        let upstream: Option<Arc<dyn RouteHandler>> = match &self.upstream {
            Some(u) => Some(Arc::new(UpstreamHandler::new(http.clone(), &u.base_url)?)),
            None => None,
        };
        let mut routes = Vec::with_capacity(self.routes.len());

        for rc in &self.routes {
            let method = rc
                .method
                .parse::<HttpMethod>()
                .with_context(|| format!("route {} {}", rc.method, rc.path))?;

            let handler: Arc<dyn RouteHandler> = match &rc.handler {
                HandlerConfig::Static { status, body } => Arc::new(StaticHandler {
                    status: *status,
                    body: body.clone(),
                }),
                HandlerConfig::Upstream => upstream.clone().with_context(|| {
                    format!("route {} {} forwards upstream but [upstream] is not configured", rc.method, rc.path)
                })?,
            };

            let mut route = Route::new(method, rc.path.clone(), handler);
            route.summary = rc.summary.clone();
            route.description = rc.description.clone();
            route.tags = rc.tags.clone();
            route.parameters = rc.parameters.clone();
            route.body_schema = rc.body_schema.clone();
            route.body_required = rc.body_required;
            route.response_schema = rc.response_schema.clone();
            routes.push(route);
        }
        Ok(routes)
    }

    /// Enabled bridges, in declaration order.
    pub fn build_bridges(&self, http: &reqwest::Client) -> anyhow::Result<BridgeSet> {
        let mut set = BridgeSet::new();
        for bc in self.bridges.iter().filter(|b| b.enabled) {
            let prefixes = match &bc.strip_prefixes {
                Some(p) => PrefixRules::new(p.clone()),
                None => PrefixRules::defaults_for(&bc.name),
            };
            let provider = build_provider(http, bc)?;
            set.insert_with_prefixes(bc.name.clone(), prefixes, provider);
        }
        Ok(set)
    }

    pub fn build_store(&self) -> MemoryStore {
        MemoryStore::new(
            self.prompts.clone(),
            self.resources.clone(),
            self.resource_templates.clone(),
        )
        .with_cache_capacity(self.render_cache_capacity.unwrap_or(RENDER_CACHE_CAPACITY))
    }
}

fn build_provider(
    http: &reqwest::Client,
    bc: &BridgeConfig,
) -> anyhow::Result<Arc<dyn crate::bridge::BridgeProvider>> {
    match &bc.transport {
        TransportConfig::Stdio { command, args, framing } => {
            #[cfg(feature = "stdio-bridge")]
            {
                use crate::bridge::stdio::{StdioBridge, StdioCommand};
                let _ = http;
                Ok(Arc::new(StdioBridge::new(
                    bc.name.clone(),
                    StdioCommand {
                        command: command.clone(),
                        args: args.clone(),
                        framing: *framing,
                    },
                )))
            }
            #[cfg(not(feature = "stdio-bridge"))]
            {
                let _ = (http, command, args, framing);
                anyhow::bail!("bridge {}: stdio bridges are not enabled in this build", bc.name)
            }
        }
        TransportConfig::Http { url } => {
            #[cfg(feature = "http-bridge")]
            {
                let b = crate::bridge::http::HttpBridge::new(http.clone(), url)
                    .with_context(|| format!("bridge {}", bc.name))?;
                Ok(Arc::new(b))
            }
            #[cfg(not(feature = "http-bridge"))]
            {
                let _ = (http, url);
                anyhow::bail!("bridge {}: http bridges are not enabled in this build", bc.name)
            }
        }
    }
}

fn parse_flag(v: &str) -> anyhow::Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}
