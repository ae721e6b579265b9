use anyhow::Context;
use routegate::bridge::BridgeSet;
use routegate::catalog::{ToolDefinition, ToolOrigin};
use routegate::codec::Framing;
use routegate::config::Config;
use routegate::metrics::RequestCounters;
use routegate::protocol::{JsonRpcRequest, ProtocolRouter, SessionState};
use routegate::route::StaticRoutes;
use routegate::server;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct Gateway {
    pub router: ProtocolRouter,
    pub bridges: BridgeSet,
}

pub fn build_gateway(http: &reqwest::Client, cfg: &Config) -> anyhow::Result<Gateway> {
    let routes = cfg.build_routes(http)?;
    let bridges = cfg.build_bridges(http)?;
    let store = Arc::new(cfg.build_store());

    let router = ProtocolRouter::new(Arc::new(StaticRoutes::new(routes)), Arc::new(bridges.clone()))
        .with_prompts(store.clone())
        .with_resources(store.clone())
        .with_cache(store)
        .with_tracker(Arc::new(RequestCounters::new()))
        .with_options(cfg.router_options()?);

    Ok(Gateway { router, bridges })
}

pub async fn cmd_serve(gw: &Gateway, framing: Framing) -> anyhow::Result<()> {
    server::serve_stdio(&gw.router, framing).await
}

pub async fn cmd_tools(gw: &Gateway) -> anyhow::Result<()> {
    let mut session = SessionState::default();
    let result = request(&gw.router, &mut session, "tools/list", Value::Null).await?;
    let tools: Vec<ToolDefinition> =
        serde_json::from_value(result["tools"].clone()).context("unexpected tools/list shape")?;

    if tools.is_empty() {
        println!("(no tools)");
        return Ok(());
    }
    for t in &tools {
        let origin = match &t.origin {
            ToolOrigin::Local => "local".to_string(),
            ToolOrigin::Bridge { server, .. } => format!("bridge:{server}"),
        };
        let first_line = t.description.lines().next().unwrap_or("");
        println!("{}\t{}\t{}", t.name, origin, first_line);
    }
    Ok(())
}

pub async fn cmd_call(gw: &Gateway, name: &str, args: Option<&str>) -> anyhow::Result<()> {
    let arguments: Map<String, Value> = match args {
        Some(raw) => serde_json::from_str(raw).context("ARGS_JSON must be a JSON object")?,
        None => Map::new(),
    };

    let mut session = SessionState::default();
    // Listing first records bridge origins so the call can route directly.
    request(&gw.router, &mut session, "tools/list", Value::Null).await?;
    let result = request(
        &gw.router,
        &mut session,
        "tools/call",
        json!({ "name": name, "arguments": arguments }),
    )
    .await?;

    for block in result["content"].as_array().into_iter().flatten() {
        match block.get("text").and_then(Value::as_str) {
            Some(text) => println!("{text}"),
            None => println!("{block}"),
        }
    }
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        anyhow::bail!("tool {name} reported an error");
    }
    Ok(())
}

pub async fn cmd_bridges(gw: &Gateway, cfg: &Config) -> anyhow::Result<()> {
    if cfg.bridges.is_empty() {
        println!("(no bridges configured)");
        return Ok(());
    }

    let timeout = gw.router.options().timeouts.bridge_list;
    for bc in &cfg.bridges {
        let status = match gw.bridges.get(&bc.name).filter(|_| bc.enabled) {
            None => "disabled".to_string(),
            Some(entry) => match tokio::time::timeout(timeout, entry.provider.list_tools()).await {
                Ok(Ok(tools)) => format!("{} tools", tools.len()),
                Ok(Err(e)) => format!("error: {e:#}"),
                Err(_) => format!("timed out after {}s", timeout.as_secs()),
            },
        };
        println!("{}\t{}\t{}", bc.name, bc.transport.label(), status);
    }
    Ok(())
}

async fn request(
    router: &ProtocolRouter,
    session: &mut SessionState,
    method: &str,
    params: Value,
) -> anyhow::Result<Value> {
    let resp = router
        .process_request(JsonRpcRequest::new(1, method, params), session)
        .await;
    if let Some(err) = resp.error {
        anyhow::bail!("{method} failed ({}): {}", err.code, err.message);
    }
    resp.result.with_context(|| format!("{method} returned no result"))
}
