use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

/// Sink for per-call outcomes recorded by the protocol router.
pub trait RequestTracker: Send + Sync {
    fn track_request(&self, kind: &str, started: Instant, success: bool, error_type: Option<&str>);

    /// JSON view served by the `metrics` method.
    fn snapshot(&self) -> Value;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    pub total: u64,
    pub failures: u64,
    pub total_ms: u64,
    pub max_ms: u64,
    pub errors: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct RequestCounters {
    kinds: Mutex<BTreeMap<String, KindStats>>,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str) -> Option<KindStats> {
        self.kinds
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(kind)
            .cloned()
    }
}

impl RequestTracker for RequestCounters {
    fn track_request(&self, kind: &str, started: Instant, success: bool, error_type: Option<&str>) {
        let elapsed = started.elapsed().as_millis() as u64;
        let mut kinds = self.kinds.lock().unwrap_or_else(|p| p.into_inner());
        let stats = kinds.entry(kind.to_string()).or_default();
        stats.total += 1;
        stats.total_ms += elapsed;
        stats.max_ms = stats.max_ms.max(elapsed);
        if !success {
            stats.failures += 1;
            *stats
                .errors
                .entry(error_type.unwrap_or("unknown").to_string())
                .or_default() += 1;
        }
    }

    fn snapshot(&self) -> Value {
        let kinds = self.kinds.lock().unwrap_or_else(|p| p.into_inner());
        serde_json::to_value(&*kinds).unwrap_or(Value::Null)
    }
}
