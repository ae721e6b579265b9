use super::BridgeProvider;
use crate::codec::{self, Framing};
use anyhow::{anyhow, Context};
use futures_core::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioCommand {
    pub command: String,
    pub args: Vec<String>,
    pub framing: Framing,
}

/// MCP server spawned as a child process and spoken to over its stdio.
///
/// The child is started on first use and kept alive. A request that is
/// dropped mid-flight (e.g. by a timeout) leaves the stream in an unknown
/// state, so the connection is discarded and respawned on next use.
#[derive(Debug)]
pub struct StdioBridge {
    server: String,
    spec: StdioCommand,
    conn: Mutex<Option<StdioRpc>>,
}

impl StdioBridge {
    pub fn new(server: impl Into<String>, spec: StdioCommand) -> Self {
        Self {
            server: server.into(),
            spec,
            conn: Mutex::new(None),
        }
    }

    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let mut guard = self.conn.lock().await;
        if guard.as_ref().is_some_and(|c| c.poisoned) {
            debug!(bridge = %self.server, "dropping poisoned connection");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(StdioRpc::connect(&self.server, &self.spec).await?);
        }
        let Some(rpc) = guard.as_mut() else {
            return Err(anyhow!("bridge connection unavailable"));
        };

        match rpc.request(method, params).await {
            Ok(v) => Ok(v),
            Err(e) => {
                // Remote JSON-RPC errors keep the stream usable; transport errors do not.
                if e.downcast_ref::<RemoteError>().is_none() {
                    *guard = None;
                }
                Err(e)
            }
        }
    }
}

impl BridgeProvider for StdioBridge {
    fn list_tools(&self) -> BoxFuture<'_, anyhow::Result<Vec<Value>>> {
        Box::pin(async move {
            let result = self.request("tools/list", json!({})).await.context("tools/list failed")?;
            let list: ToolsListResult = serde_json::from_value(result).context("invalid tools/list result")?;
            Ok(list.tools)
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

#[derive(Debug, Clone, Serialize)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: Value,
    #[serde(rename = "clientInfo")]
    client_info: ClientInfo,
}

#[derive(Debug, Clone, Serialize)]
struct ClientInfo {
    name: String,
    version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("MCP error {code}: {message}")]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug)]
struct StdioRpc {
    // Held so the child is killed with the connection.
    _child: tokio::process::Child,
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
    framing: Framing,
    next_id: u64,
    poisoned: bool,
}

impl StdioRpc {
    async fn connect(server: &str, spec: &StdioCommand) -> anyhow::Result<Self> {
        let mut rpc = Self::spawn(spec)?;
        rpc.request(
            "initialize",
            serde_json::to_value(InitializeParams {
                protocol_version: crate::protocol::MCP_PROTOCOL_VERSION.to_string(),
                capabilities: json!({}),
                client_info: ClientInfo {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            })?,
        )
        .await
        .context("initialize failed")?;
        rpc.notify("notifications/initialized").await?;
        info!(bridge = server, command = %spec.command, "stdio bridge connected");
        Ok(rpc)
    }

    fn spawn(spec: &StdioCommand) -> anyhow::Result<Self> {
        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn MCP server: {} {:?}", spec.command, spec.args))?;

        let stdin = child.stdin.take().context("child stdin missing")?;
        let stdout = child.stdout.take().context("child stdout missing")?;

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
            framing: spec.framing,
            next_id: 1,
            poisoned: false,
        })
    }

    async fn notify(&mut self, method: &str) -> anyhow::Result<()> {
        let msg = json!({ "jsonrpc": "2.0", "method": method });
        codec::write_message(&mut self.stdin, self.framing, &msg).await
    }

    async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let req = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.poisoned = true;
        codec::write_message(&mut self.stdin, self.framing, &req).await?;

        loop {
            let raw = codec::read_message(&mut self.stdout, self.framing)
                .await?
                .ok_or_else(|| anyhow!("MCP server closed stdout"))?;
            let v: Value = codec::decode(&raw)?;

            // Late replies to abandoned requests and server notifications.
            if v.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            self.poisoned = false;

            if let Some(err) = v.get("error") {
                return Err(RemoteError {
                    code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: err
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                }
                .into());
            }
            return Ok(v.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}
