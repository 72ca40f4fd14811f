//! Level 1 memory: a bounded, TTL-aware in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{Layer, MemoryExperience, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Receives experiences evicted from [`Buffer`]. The receiving tier must be
/// idempotent: eviction is advisory and proceeds whether or not the sink
/// succeeds.
#[async_trait]
pub trait EvictionSink: Send + Sync {
    async fn on_eviction(&self, exp: MemoryExperience);
}

struct Inner {
    entries: HashMap<String, MemoryExperience>,
    session_context: HashMap<String, serde_json::Value>,
    working_memory: HashSet<String>,
}

/// LRU+TTL in-memory store with eviction callback.
pub struct Buffer {
    capacity: usize,
    default_ttl_seconds: u64,
    inner: Mutex<Inner>,
    on_eviction: Option<Arc<dyn EvictionSink>>,
}

impl Buffer {
    pub fn new(capacity: usize, default_ttl_seconds: u64, on_eviction: Option<Arc<dyn EvictionSink>>) -> Self {
        Buffer {
            capacity,
            default_ttl_seconds,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                session_context: HashMap::new(),
                working_memory: HashSet::new(),
            }),
            on_eviction,
        }
    }

    /// Priority score: `0.5*recency + 0.3*log(1+access_count) + 0.2*phi_weight_normalized`.
    fn priority_score(&self, exp: &MemoryExperience) -> f64 {
        let age_seconds = (chrono::Utc::now() - exp.updated_at).num_seconds().max(0) as f64;
        let recency = (1.0 - age_seconds / self.default_ttl_seconds.max(1) as f64).clamp(0.0, 1.0);
        let access_component = (1.0 + exp.phi_metrics.access_count as f64).ln();
        let phi_normalized = (exp.phi_metrics.phi_weight / memoria_core::PHI).clamp(0.0, 1.0);
        0.5 * recency + 0.3 * access_component + 0.2 * phi_normalized
    }

    pub async fn store(&self, mut exp: MemoryExperience) -> Result<()> {
        exp.layer = Layer::Buffer;
        self.insert(exp).await
    }

    /// Cache a copy without touching `layer` — used when a deeper-tier hit
    /// is opportunistically re-cached into Buffer; canonical residence
    /// stays wherever it actually lives.
    pub async fn store_preserving_layer(&self, exp: MemoryExperience) -> Result<()> {
        self.insert(exp).await
    }

    async fn insert(&self, mut exp: MemoryExperience) -> Result<()> {
        if exp.ttl_seconds.is_none() {
            exp.ttl_seconds = Some(self.default_ttl_seconds);
        }
        let to_evict = {
            let mut guard = self.inner.lock().await;
            guard.entries.insert(exp.id.clone(), exp);
            self.overflow_ids(&guard.entries)
        };
        for id in to_evict {
            self.evict(id).await;
        }
        Ok(())
    }

    fn overflow_ids(&self, entries: &HashMap<String, MemoryExperience>) -> Vec<String> {
        if entries.len() <= self.capacity {
            return Vec::new();
        }
        let mut scored: Vec<(String, f64)> = entries
            .iter()
            .map(|(id, exp)| (id.clone(), self.priority_score(exp)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let overflow = entries.len() - self.capacity;
        scored.into_iter().take(overflow).map(|(id, _)| id).collect()
    }

    async fn evict(&self, id: String) {
        let removed = {
            let mut guard = self.inner.lock().await;
            guard.entries.remove(&id)
        };
        if let Some(exp) = removed {
            if let Some(sink) = &self.on_eviction {
                sink.on_eviction(exp).await;
            }
            debug!(id = %id, "buffer eviction");
        }
    }

    pub async fn retrieve(&self, id: &str) -> Option<MemoryExperience> {
        let mut guard = self.inner.lock().await;
        match guard.entries.get(id) {
            Some(exp) if exp.is_expired() => {
                guard.entries.remove(id);
                None
            }
            Some(exp) => {
                let mut found = exp.clone();
                found.phi_metrics.record_access();
                guard.entries.insert(id.to_string(), found.clone());
                Some(found)
            }
            None => None,
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryExperience> {
        let guard = self.inner.lock().await;
        let query_lower = query.to_lowercase();
        let query_words: HashSet<&str> = query_lower.split_whitespace().collect();

        let mut scored: Vec<(f64, MemoryExperience)> = guard
            .entries
            .values()
            .filter(|exp| !exp.is_expired())
            .filter_map(|exp| {
                let content_lower = exp.content.to_lowercase();
                let mut score = 0.0;
                if content_lower.contains(&query_lower) {
                    score += 1.0;
                }
                for word in &query_words {
                    if content_lower.contains(word) {
                        score += 0.2;
                    }
                }
                for kw in &exp.keywords {
                    if query_lower.contains(&kw.to_lowercase()) {
                        score += 0.3;
                    }
                }
                for tag in &exp.tags {
                    if query_lower.contains(&tag.to_lowercase()) {
                        score += 0.15;
                    }
                }
                if score > 0.0 {
                    Some((score, exp.clone()))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, exp)| exp).collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut guard = self.inner.lock().await;
        guard.entries.remove(id).is_some()
    }

    pub async fn clear(&self) -> usize {
        let mut guard = self.inner.lock().await;
        let count = guard.entries.len();
        guard.entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn set_context(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().await.session_context.insert(key.into(), value);
    }

    pub async fn get_context(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.session_context.get(key).cloned()
    }

    pub async fn remember_working(&self, id: impl Into<String>) {
        self.inner.lock().await.working_memory.insert(id.into());
    }

    pub async fn working_memory(&self) -> HashSet<String> {
        self.inner.lock().await.working_memory.clone()
    }

    /// Remove expired entries without regard to capacity. Called lazily
    /// during traversal and explicitly by `ConsolidationEngine`'s CLEANUP
    /// phase.
    pub async fn prune_expired(&self) -> usize {
        let mut guard = self.inner.lock().await;
        let expired: Vec<String> = guard
            .entries
            .iter()
            .filter(|(_, exp)| exp.is_expired())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            guard.entries.remove(id);
        }
        if !expired.is_empty() {
            warn!(count = expired.len(), "buffer pruned expired entries");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryType;

    #[tokio::test]
    async fn store_then_retrieve_round_trips_content() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        let exp = MemoryExperience::new("hello world", MemoryType::Seed);
        let id = exp.id.clone();
        let original_type = exp.memory_type;
        buf.store(exp.clone()).await.unwrap();
        let found = buf.retrieve(&id).await.unwrap();
        assert_eq!(found.content, exp.content);
        assert_eq!(found.memory_type, original_type);
    }

    #[tokio::test]
    async fn store_sets_layer_to_buffer() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        let mut exp = MemoryExperience::new("x", MemoryType::Seed);
        exp.layer = memoria_core::Layer::Archive;
        buf.store(exp.clone()).await.unwrap();
        let found = buf.retrieve(&exp.id).await.unwrap();
        assert_eq!(found.layer, memoria_core::Layer::Buffer);
    }

    #[tokio::test]
    async fn capacity_is_enforced_after_store() {
        let buf = Buffer::new(5, DEFAULT_TTL_SECONDS, None);
        for i in 0..10 {
            buf.store(MemoryExperience::new(format!("item {i}"), MemoryType::Seed))
                .await
                .unwrap();
        }
        assert!(buf.len().await <= 5);
    }

    #[tokio::test]
    async fn eviction_invokes_callback() {
        struct Collector(Arc<Mutex<Vec<String>>>);
        #[async_trait]
        impl EvictionSink for Collector {
            async fn on_eviction(&self, exp: MemoryExperience) {
                self.0.lock().await.push(exp.id);
            }
        }
        let collected = Arc::new(Mutex::new(Vec::new()));
        let buf = Buffer::new(2, DEFAULT_TTL_SECONDS, Some(Arc::new(Collector(collected.clone()))));
        for i in 0..5 {
            buf.store(MemoryExperience::new(format!("item {i}"), MemoryType::Seed))
                .await
                .unwrap();
        }
        assert_eq!(collected.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn search_is_content_driven() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        let mut exp = MemoryExperience::new("discussing fibonacci tilings", MemoryType::Seed);
        exp.tags.insert("math".to_string());
        buf.store(exp).await.unwrap();
        let results = buf.search("fibonacci", 10).await;
        assert_eq!(results.len(), 1);
        let results = buf.search("unrelated topic", 10).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        let exp = MemoryExperience::new("temp", MemoryType::Seed);
        let id = exp.id.clone();
        buf.store(exp).await.unwrap();
        assert!(buf.delete(&id).await);
        assert!(buf.retrieve(&id).await.is_none());
    }

    #[tokio::test]
    async fn clear_reports_count_and_empties() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        for i in 0..3 {
            buf.store(MemoryExperience::new(format!("i{i}"), MemoryType::Seed))
                .await
                .unwrap();
        }
        assert_eq!(buf.clear().await, 3);
        assert!(buf.is_empty().await);
    }

    #[tokio::test]
    async fn session_context_roundtrips() {
        let buf = Buffer::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECONDS, None);
        buf.set_context("topic", serde_json::json!("fibonacci")).await;
        assert_eq!(buf.get_context("topic").await, Some(serde_json::json!("fibonacci")));
    }
}
