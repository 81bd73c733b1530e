use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

/// Collection stored in a fjall partition. Values are wrapped in a JSON
/// envelope carrying the expiry.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.partition.get(key)? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if let Some(expires_at) = entry.expires_at
            && SystemTime::now() > expires_at
        {
            debug!(
                "Cache entry expired for key: {}",
                String::from_utf8_lossy(key)
            );
            self.partition.remove(key)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn write(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        let keys = self
            .partition
            .keys()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for key in keys {
            self.partition.remove(key)?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.read(key) {
            Ok(Some(value)) => {
                debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
                Some(value)
            }
            Ok(None) => {
                debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
                None
            }
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.write(key, value, ttl).with_context(|| {
            format!("Failed to write {} to disk", String::from_utf8_lossy(key))
        })?;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }

    async fn clear(&self) {
        if let Err(e) = self.clear_all() {
            debug!("DiskCollection clear error: {}", e)
        }
    }
}
