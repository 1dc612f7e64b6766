//! LLM Response Cache
//!
//! Memoises provider replies so a re-queued ticket does not pay twice for the
//! same prompt. Bounded; the oldest entry is evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};
use async_trait::async_trait;
use crate::agent::LLMProvider;

const DEFAULT_CAPACITY: usize = 256;

type CacheKey = [u8; 32];

#[derive(Default)]
struct CacheEntries {
    responses: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
}

pub struct LLMCache {
    entries: Mutex<CacheEntries>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LLMCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(CacheEntries::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(model: &str, prompt: &str, system: Option<&str>) -> CacheKey {
        let mut hasher = Sha256::new();
        for part in [model, prompt, system.unwrap_or("")] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().into()
    }

    pub async fn get(&self, model: &str, prompt: &str, system: Option<&str>) -> Option<String> {
        let key = Self::key(model, prompt, system);
        let found = self.entries.lock().await.responses.get(&key).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub async fn set(&self, model: &str, prompt: &str, system: Option<&str>, response: String) {
        let key = Self::key(model, prompt, system);
        let mut entries = self.entries.lock().await;

        if entries.responses.insert(key, response).is_none() {
            entries.order.push_back(key);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.responses.remove(&oldest);
            }
        }
    }

    pub async fn remove(&self, model: &str, prompt: &str, system: Option<&str>) -> bool {
        let key = Self::key(model, prompt, system);
        let mut entries = self.entries.lock().await;
        if entries.responses.remove(&key).is_some() {
            entries.order.retain(|k| k != &key);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.responses.len()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

impl Default for LLMCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider that wraps another provider with a cache
pub struct CachedProvider {
    inner: Arc<dyn LLMProvider>,
    cache: Arc<LLMCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, cache: Arc<LLMCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LLMProvider for CachedProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> anyhow::Result<String> {
        if let Some(cached) = self.cache.get(model, &prompt, system.as_deref()).await {
            tracing::debug!("LLM cache hit for model {}", model);
            return Ok(cached);
        }

        let response = self.inner.generate(model, prompt.clone(), system.clone()).await?;
        self.cache.set(model, &prompt, system.as_deref(), response.clone()).await;
        Ok(response)
    }

    async fn forget(&self, model: &str, prompt: &str, system: Option<&str>) {
        if self.cache.remove(model, prompt, system).await {
            tracing::debug!("Evicted cached reply for model {}", model);
        }
        self.inner.forget(model, prompt, system).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for CountingProvider {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {}", prompt))
        }
    }

    #[tokio::test]
    async fn test_cache_get_set() {
        let cache = LLMCache::new();
        cache.set("m", "prompt", Some("sys"), "reply".into()).await;

        assert_eq!(cache.get("m", "prompt", Some("sys")).await.as_deref(), Some("reply"));
        assert!(cache.get("m", "prompt", None).await.is_none());
        assert!(cache.get("other", "prompt", Some("sys")).await.is_none());
        assert_eq!(cache.stats(), (1, 2));
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let cache = LLMCache::with_capacity(2);
        cache.set("m", "p1", None, "r1".into()).await;
        cache.set("m", "p2", None, "r2".into()).await;
        cache.set("m", "p3", None, "r3".into()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("m", "p1", None).await.is_none());
        assert_eq!(cache.get("m", "p3", None).await.as_deref(), Some("r3"));
    }

    #[tokio::test]
    async fn test_cached_provider_skips_repeat_calls() {
        let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let provider = CachedProvider::new(inner.clone(), Arc::new(LLMCache::new()));

        let first = provider.generate("m", "hello".into(), None).await.unwrap();
        let second = provider.generate("m", "hello".into(), None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forget_sends_next_call_to_inner() {
        let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let cache = Arc::new(LLMCache::new());
        let provider = CachedProvider::new(inner.clone(), cache.clone());

        provider.generate("m", "hello".into(), Some("sys".into())).await.unwrap();
        provider.forget("m", "hello", Some("sys")).await;
        assert_eq!(cache.len().await, 0);

        provider.generate("m", "hello".into(), Some("sys".into())).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.remove("m", "missing", None).await);
    }
}
