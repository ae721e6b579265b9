//! Federated tool providers ("bridges").
//!
//! A bridge is any external source speaking MCP tool semantics. The core only
//! sees the [`BridgeProvider`] trait and an ordered [`BridgeSet`] snapshot.

#[cfg(feature = "http-bridge")]
pub mod http;
#[cfg(feature = "stdio-bridge")]
pub mod stdio;

use futures_core::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

pub trait BridgeProvider: Send + Sync {
    /// Raw tool descriptors as reported by the remote side. Shapes are not
    /// trusted; the catalog builder sanitizes them.
    fn list_tools(&self) -> BoxFuture<'_, anyhow::Result<Vec<Value>>>;

    /// Raw `tools/call` result. A usable result carries `content`.
    fn call_tool<'a>(&'a self, name: &'a str, arguments: Value) -> BoxFuture<'a, anyhow::Result<Value>>;
}

/// Prefixes stripped from raw tool names before they are exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixRules {
    prefixes: Vec<String>,
}

impl PrefixRules {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// Built-in rules for bridges without explicit configuration.
    ///
    /// Only bridges known to prefix their names get stripping; applying it
    /// everywhere would collide names for bridges that are already clean.
    pub fn defaults_for(server: &str) -> Self {
        match server {
            "chrome" => Self::new(vec!["chrome_".into(), "mcp_".into()]),
            _ => Self::default(),
        }
    }

    pub fn clean<'a>(&self, raw: &'a str) -> &'a str {
        for prefix in &self.prefixes {
            if let Some(rest) = raw.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() {
                    return rest;
                }
            }
        }
        raw
    }
}

#[derive(Clone)]
pub struct BridgeEntry {
    pub name: String,
    pub prefixes: PrefixRules,
    pub provider: Arc<dyn BridgeProvider>,
}

impl std::fmt::Debug for BridgeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEntry")
            .field("name", &self.name)
            .field("prefixes", &self.prefixes)
            .finish_non_exhaustive()
    }
}

/// Ordered bridge snapshot. Iteration order drives tool-list order.
#[derive(Debug, Clone, Default)]
pub struct BridgeSet {
    entries: Vec<BridgeEntry>,
}

impl BridgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge with its default prefix rules. A later bridge with the
    /// same name replaces the earlier one in place.
    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn BridgeProvider>) {
        let name = name.into();
        let prefixes = PrefixRules::defaults_for(&name);
        self.insert_with_prefixes(name, prefixes, provider);
    }

    pub fn insert_with_prefixes(
        &mut self,
        name: impl Into<String>,
        prefixes: PrefixRules,
        provider: Arc<dyn BridgeProvider>,
    ) {
        let entry = BridgeEntry {
            name: name.into(),
            prefixes,
            provider,
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BridgeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BridgeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Externally owned set of active bridges.
pub trait BridgeSource: Send + Sync {
    fn snapshot(&self) -> BridgeSet;
}

impl BridgeSource for BridgeSet {
    fn snapshot(&self) -> BridgeSet {
        self.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-process bridge with scripted behaviour.
    #[derive(Default)]
    pub struct FakeBridge {
        pub tools: Vec<Value>,
        /// Names `call_tool` accepts; everything else errors.
        pub accepts: Vec<String>,
        pub list_fails: bool,
        pub list_delay: Option<Duration>,
        pub call_delay: Option<Duration>,
        /// Reply without `content` for accepted names.
        pub reply_without_content: bool,
        pub calls: Mutex<Vec<String>>,
        pub list_calls: Mutex<usize>,
    }

    impl FakeBridge {
        pub fn with_tools(names: &[&str]) -> Self {
            Self {
                tools: names
                    .iter()
                    .map(|n| json!({"name": n, "description": format!("{n} tool"), "inputSchema": {"type": "object", "properties": {}}}))
                    .collect(),
                accepts: names.iter().map(|n| n.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn list_count(&self) -> usize {
            *self.list_calls.lock().unwrap()
        }
    }

    impl BridgeProvider for FakeBridge {
        fn list_tools(&self) -> BoxFuture<'_, anyhow::Result<Vec<Value>>> {
            Box::pin(async move {
                *self.list_calls.lock().unwrap() += 1;
                if let Some(d) = self.list_delay {
                    tokio::time::sleep(d).await;
                }
                if self.list_fails {
                    anyhow::bail!("bridge offline");
                }
                Ok(self.tools.clone())
            })
        }

        fn call_tool<'a>(&'a self, name: &'a str, arguments: Value) -> BoxFuture<'a, anyhow::Result<Value>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(name.to_string());
                if let Some(d) = self.call_delay {
                    tokio::time::sleep(d).await;
                }
                if !self.accepts.iter().any(|a| a == name) {
                    anyhow::bail!("unknown tool: {name}");
                }
                if self.reply_without_content {
                    return Ok(json!({"ok": true}));
                }
                Ok(json!({
                    "content": [{"type": "text", "text": format!("{name} <- {arguments}")}]
                }))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeBridge;
    use super::*;

    #[test]
    fn chrome_rules_strip_known_prefixes() {
        let rules = PrefixRules::defaults_for("chrome");
        assert_eq!(rules.clean("chrome_new_page"), "new_page");
        assert_eq!(rules.clean("mcp_screenshot"), "screenshot");
        assert_eq!(rules.clean("chrome_"), "chrome_");
        assert_eq!(rules.clean("navigate"), "navigate");
    }

    #[test]
    fn unknown_bridges_keep_names() {
        let rules = PrefixRules::defaults_for("files");
        assert_eq!(rules.clean("mcp_read"), "mcp_read");
    }

    #[test]
    fn insert_replaces_same_name_in_place() {
        let mut set = BridgeSet::new();
        set.insert("a", Arc::new(FakeBridge::default()));
        set.insert("b", Arc::new(FakeBridge::default()));
        set.insert_with_prefixes("a", PrefixRules::new(vec!["x_".into()]), Arc::new(FakeBridge::default()));
        let names: Vec<_> = set.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(set.get("a").unwrap().prefixes.clean("x_y"), "y");
    }
}
