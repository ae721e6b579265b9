//! Prompt and resource stores behind the pass-through MCP methods.
//!
//! Loading and hot-reloading live outside the gateway; these traits are the
//! lookup surface the protocol router reads from.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    /// Message text; `{{arg}}` placeholders are filled at `prompts/get`.
    #[serde(skip_serializing)]
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_mime", alias = "mime_type")]
    pub mime_type: String,
    #[serde(skip_serializing)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    #[serde(alias = "uri_template")]
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_mime", alias = "mime_type")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "text/plain".to_string()
}

pub trait PromptStore: Send + Sync {
    fn list(&self) -> Vec<Prompt>;
    fn get(&self, name: &str) -> Option<Prompt>;

    /// Rendered message text, or `None` when the prompt is unknown.
    fn render(&self, name: &str, arguments: &Map<String, Value>) -> Option<String> {
        self.get(name).map(|p| render_template(&p.template, arguments))
    }
}

pub trait ResourceStore: Send + Sync {
    fn list(&self) -> Vec<Resource>;
    fn get(&self, uri: &str) -> Option<Resource>;
    fn templates(&self) -> Vec<ResourceTemplate> {
        Vec::new()
    }
}

/// Control surface for whatever caches prompt/resource content.
pub trait ContentCache: Send + Sync {
    fn stats(&self) -> Value;
    fn clear(&self) -> Value;
}

/// Used when nothing caches content.
#[derive(Debug, Default)]
pub struct NoCache;

impl ContentCache for NoCache {
    fn stats(&self) -> Value {
        json!({ "enabled": false })
    }

    fn clear(&self) -> Value {
        json!({ "enabled": false, "cleared": 0 })
    }
}

pub fn render_template(template: &str, arguments: &Map<String, Value>) -> String {
    let mut out = template.to_string();
    for (name, value) in arguments {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{{{name}}}}}"), &text);
    }
    out
}

pub const RENDER_CACHE_CAPACITY: usize = 256;

/// Rendered prompt text, evicted oldest-first once `capacity` is reached.
#[derive(Debug, Default)]
struct RenderCache {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl RenderCache {
    fn insert(&mut self, key: String, text: String, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.entries.len() >= capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, text);
    }
}

/// Prompts and resources held in memory (typically loaded from config),
/// with a bounded cache of rendered prompt text.
#[derive(Debug)]
pub struct MemoryStore {
    prompts: Vec<Prompt>,
    resources: Vec<Resource>,
    templates: Vec<ResourceTemplate>,
    capacity: usize,
    cache: Mutex<RenderCache>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }
}

impl MemoryStore {
    pub fn new(prompts: Vec<Prompt>, resources: Vec<Resource>, templates: Vec<ResourceTemplate>) -> Self {
        Self {
            prompts,
            resources,
            templates,
            capacity: RENDER_CACHE_CAPACITY,
            cache: Mutex::new(RenderCache::default()),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn cache_key(name: &str, arguments: &Map<String, Value>) -> String {
        format!("{name}:{}", Value::Object(arguments.clone()))
    }
}

impl PromptStore for MemoryStore {
    fn list(&self) -> Vec<Prompt> {
        self.prompts.clone()
    }

    fn get(&self, name: &str) -> Option<Prompt> {
        self.prompts.iter().find(|p| p.name == name).cloned()
    }

    fn render(&self, name: &str, arguments: &Map<String, Value>) -> Option<String> {
        let key = Self::cache_key(name, arguments);
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(text) = cache.entries.get(&key).cloned() {
            cache.hits += 1;
            return Some(text);
        }
        let prompt = self.prompts.iter().find(|p| p.name == name)?;
        let text = render_template(&prompt.template, arguments);
        cache.misses += 1;
        cache.insert(key, text.clone(), self.capacity);
        Some(text)
    }
}

impl ResourceStore for MemoryStore {
    fn list(&self) -> Vec<Resource> {
        self.resources.clone()
    }

    fn get(&self, uri: &str) -> Option<Resource> {
        self.resources.iter().find(|r| r.uri == uri).cloned()
    }

    fn templates(&self) -> Vec<ResourceTemplate> {
        self.templates.clone()
    }
}

impl ContentCache for MemoryStore {
    fn stats(&self) -> Value {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        json!({
            "enabled": true,
            "entries": cache.entries.len(),
            "capacity": self.capacity,
            "hits": cache.hits,
            "misses": cache.misses,
        })
    }

    fn clear(&self) -> Value {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let cleared = cache.entries.len();
        *cache = RenderCache::default();
        json!({ "enabled": true, "cleared": cleared })
    }
}
