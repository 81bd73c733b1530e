//! Key-value cache abstractions and the refresh policy shared by providers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn remove(&self, key: &[u8]);
    async fn clear(&self);
}

pub trait Store: Send + Sync {
    /// Returns the named collection. Persistent collections live on disk and
    /// survive restarts; the rest are process-local.
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>>;

    fn remove_collection(&self, name: &str) -> bool;
}

/// A stored value together with the moment it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub stale: bool,
}

impl<T> Cached<T> {
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }
}

pub async fn read_json<T: DeserializeOwned>(
    collection: &dyn KeyValueCollection,
    key: &str,
) -> Option<T> {
    let bytes = collection.get(key.as_bytes()).await?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Discarding unreadable cache entry {}: {}", key, e);
            None
        }
    }
}

pub async fn write_json<T: Serialize>(
    collection: &dyn KeyValueCollection,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .with_context(|| format!("Failed to serialize cache entry {key}"))?;
    collection
        .put(key.as_bytes(), &bytes, ttl)
        .await
        .with_context(|| format!("Failed to store {key}"))
}

/// Serves `key` from the collection while it is younger than `max_age`,
/// otherwise calls `fetch` and stores the result. When the fetch fails and an
/// older copy exists, the old copy is returned with `stale` set.
pub async fn load_or_refresh<T, F, Fut>(
    collection: &dyn KeyValueCollection,
    key: &str,
    max_age: Duration,
    force: bool,
    fetch: F,
) -> Result<Cached<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let existing: Option<Cached<T>> = read_json(collection, key).await;
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);

    let existing = match existing {
        Some(entry) if !force && entry.age() < max_age => {
            debug!("Serving {} from cache (age {}s)", key, entry.age().num_seconds());
            return Ok(entry);
        }
        other => other,
    };

    match fetch().await {
        Ok(value) => {
            let entry = Cached {
                value,
                fetched_at: Utc::now(),
                stale: false,
            };
            if let Err(e) = write_json(collection, key, &entry, None).await {
                warn!("Could not cache {}: {:#}", key, e);
            }
            Ok(entry)
        }
        Err(e) => match existing {
            Some(mut entry) => {
                warn!(
                    "Refresh of {} failed, serving copy from {}: {:#}",
                    key, entry.fetched_at, e
                );
                entry.stale = true;
                Ok(entry)
            }
            None => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_fetches_when_missing_and_serves_from_cache_after() {
        let collection = MemoryCollection::new();

        let first: Cached<u32> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), false, || async {
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(first.value, 7);
        assert!(!first.stale);

        let second: Cached<u32> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), false, || async {
                Err(anyhow!("should not be called"))
            })
            .await
            .unwrap();
        assert_eq!(second.value, 7);
    }

    #[tokio::test]
    async fn test_force_refetches() {
        let collection = MemoryCollection::new();
        let _: Cached<u32> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), false, || async {
                Ok(1)
            })
            .await
            .unwrap();

        let refreshed: Cached<u32> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), true, || async {
                Ok(2)
            })
            .await
            .unwrap();
        assert_eq!(refreshed.value, 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_copy() {
        let collection = MemoryCollection::new();
        let _: Cached<String> =
            load_or_refresh(&collection, "k", Duration::ZERO, false, || async {
                Ok("old".to_string())
            })
            .await
            .unwrap();

        let result: Cached<String> =
            load_or_refresh(&collection, "k", Duration::ZERO, false, || async {
                Err(anyhow!("upstream down"))
            })
            .await
            .unwrap();
        assert_eq!(result.value, "old");
        assert!(result.stale);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_copy_is_an_error() {
        let collection = MemoryCollection::new();
        let result: Result<Cached<u32>> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), false, || async {
                Err(anyhow!("upstream down"))
            })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "upstream down");
    }

    #[tokio::test]
    async fn test_failed_cache_write_still_returns_value() {
        let collection = crate::store::testing::ReadOnlyCollection;
        let result: Cached<u32> =
            load_or_refresh(&collection, "k", Duration::from_secs(60), false, || async {
                Ok(3)
            })
            .await
            .unwrap();
        assert_eq!(result.value, 3);

        let err = write_json(&collection, "k", &3u32, None).await.unwrap_err();
        assert!(err.to_string().contains("Failed to store k"));
    }
}
