use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Process-local collection backed by a HashMap.
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, CacheValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock().await;
        let key_str = String::from_utf8_lossy(key);
        let expired = match cache.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|expiry| expiry < Instant::now()),
            None => {
                debug!("Cache MISS for key: {}", key_str);
                return None;
            }
        };
        if expired {
            debug!("Cache entry expired for key: {}", key_str);
            cache.remove(key);
            return None;
        }
        debug!("Cache HIT for key: {}", key_str);
        cache.get(key).map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        cache.insert(
            key.to_vec(),
            CacheValue {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &[u8]) {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
    }

    async fn clear(&self) {
        let mut cache = self.inner.lock().await;
        cache.clear();
        debug!("Cache CLEAR");
    }
}
