//! Tool catalog: routes and bridge tools as flat MCP tool definitions.

use crate::bridge::{BridgeEntry, BridgeSet};
use crate::route::Route;
use crate::schema::{self, FlatSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolOrigin {
    Local,
    Bridge {
        #[serde(rename = "bridgeServerName")]
        server: String,
        #[serde(rename = "bridgeOriginalName")]
        original_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub origin: ToolOrigin,
}

/// Deterministic tool name for a route.
///
/// `api_{path}_{method}` with every character outside `[A-Za-z0-9_-]` in the
/// path turned into `_`, so `GET /users/:id` becomes `api__users__id_get`.
/// The dispatcher joins on this name; both sides must call this function.
pub fn tool_name_for_route(route: &Route) -> String {
    let path: String = route
        .path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("api_{}_{}", path, route.method.as_str().to_ascii_lowercase())
}

/// MCP tool definition for a local route.
///
/// Declared parameters own their names: a flattened body key that collides
/// with a parameter is dropped from the schema (and from the rebuilt body).
pub fn build_tool_from_route(route: &Route) -> ToolDefinition {
    let mut flat = FlatSchema::default();

    for spec in &route.parameters {
        flat.insert(spec.name.clone(), schema::extract_parameter_schema(spec), spec.required);
    }

    if let Some(body) = &route.body_schema {
        let mut body_flat = FlatSchema::default();
        schema::flatten_object_properties(body, route.body_required, &mut body_flat);
        for (key, prop) in body_flat.properties {
            if flat.contains(&key) {
                warn!(endpoint = %route.endpoint(), key = %key, "body property shadows a parameter; keeping the parameter");
                continue;
            }
            let required = body_flat.required.contains(&key);
            flat.insert(key, prop, required);
        }
    }

    for placeholder in route.path_placeholders() {
        if !flat.contains(&placeholder) {
            flat.insert(placeholder, schema::string_schema(), true);
        } else {
            // Path params are mandatory no matter how the parameter was declared.
            flat.mark_required(&placeholder);
        }
    }

    let summary = route
        .summary
        .clone()
        .unwrap_or_else(|| format!("{} {}", route.method, route.path));
    let mut description = route
        .description
        .clone()
        .unwrap_or_else(|| format!("Execute {} request to {}", route.method, route.path));
    if let Some(response) = &route.response_schema {
        description.push_str(&format!("\n\nResponse type: {}", schema::type_label(response)));
    }

    ToolDefinition {
        name: tool_name_for_route(route),
        summary: Some(summary),
        description,
        input_schema: flat.into_schema(),
        response_schema: route.response_schema.as_ref().map(schema::normalize),
        method: Some(route.method.to_string()),
        path: Some(route.path.clone()),
        tags: route.tags.clone(),
        origin: ToolOrigin::Local,
    }
}

/// Local tools first, then every bridge's tools in bridge order.
///
/// A failing or slow bridge only loses its own tools.
pub async fn build_tools_list(routes: &[Route], bridges: &BridgeSet, list_timeout: Duration) -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = routes.iter().map(build_tool_from_route).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(tools.len());
    tools.retain(|t| {
        let fresh = seen.insert(t.name.clone());
        if !fresh {
            warn!(tool = %t.name, "duplicate route tool name; keeping the first");
        }
        fresh
    });

    for bridge in bridges.iter() {
        let raw_tools = match list_bridge_tools(bridge, list_timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(bridge = %bridge.name, error = %format!("{e:#}"), "skipping bridge tools");
                continue;
            }
        };

        for raw in &raw_tools {
            let Some(tool) = build_tool_from_bridge(bridge, raw) else {
                continue;
            };
            if !seen.insert(tool.name.clone()) {
                warn!(bridge = %bridge.name, tool = %tool.name, "tool name already taken; skipping");
                continue;
            }
            tools.push(tool);
        }
    }

    tools
}

pub(crate) async fn list_bridge_tools(bridge: &BridgeEntry, list_timeout: Duration) -> anyhow::Result<Vec<Value>> {
    match tokio::time::timeout(list_timeout, bridge.provider.list_tools()).await {
        Ok(res) => res,
        Err(_) => anyhow::bail!("tools/list timed out after {}ms", list_timeout.as_millis()),
    }
}

/// Sanitized definition for one raw bridge tool, or `None` when unusable.
pub fn build_tool_from_bridge(bridge: &BridgeEntry, raw: &Value) -> Option<ToolDefinition> {
    let Some(raw_name) = raw.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
        warn!(bridge = %bridge.name, "bridge tool without a name; skipping");
        return None;
    };
    let clean = bridge.prefixes.clean(raw_name);
    debug!(bridge = %bridge.name, raw = raw_name, clean, "registering bridge tool");

    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{clean} (via {})", bridge.name));
    let summary = description.lines().next().map(str::to_string);

    let response_schema = raw
        .get("responseSchema")
        .or_else(|| raw.get("outputSchema"))
        .filter(|v| v.is_object())
        .map(schema::normalize);

    Some(ToolDefinition {
        name: clean.to_string(),
        summary,
        description,
        input_schema: bridge_input_schema(raw.get("inputSchema").or_else(|| raw.get("input_schema"))),
        response_schema,
        method: None,
        path: None,
        tags: vec![format!("bridge:{}", bridge.name)],
        origin: ToolOrigin::Bridge {
            server: bridge.name.clone(),
            original_name: raw_name.to_string(),
        },
    })
}

fn bridge_input_schema(raw: Option<&Value>) -> Value {
    let Some(raw @ Value::Object(_)) = raw else {
        return schema::empty_object_schema();
    };
    let normalized = schema::normalize(raw);
    if normalized.get("type").and_then(Value::as_str) == Some("object") {
        normalized
    } else {
        schema::empty_object_schema()
    }
}

/// Bridge routing recorded by a previous `tools/list`.
#[derive(Debug, Clone, Default)]
pub struct CatalogHint {
    entries: HashMap<String, (String, String)>,
}

impl CatalogHint {
    pub fn from_tools(tools: &[ToolDefinition]) -> Self {
        let entries = tools
            .iter()
            .filter_map(|tool| match &tool.origin {
                ToolOrigin::Bridge { server, original_name } => {
                    Some((tool.name.clone(), (server.clone(), original_name.clone())))
                }
                ToolOrigin::Local => None,
            })
            .collect();
        Self { entries }
    }

    /// `(server, original_name)` for a bridge tool name.
    pub fn lookup(&self, name: &str) -> Option<(&str, &str)> {
        self.entries
            .get(name)
            .map(|(server, original)| (server.as_str(), original.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
