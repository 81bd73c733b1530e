pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use disk::DiskCollection;
use anyhow::{Result, anyhow};
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::warn;

/// A thread-safe key-value store that can hold multiple collections.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens the on-disk keyspace under `data_path/cache`. If the keyspace
    /// cannot be opened the store still works, with persistent collections
    /// unavailable.
    pub fn open(data_path: &Path) -> Self {
        let cache_dir = data_path.join("cache");
        let keyspace = match fjall::Config::new(&cache_dir).open() {
            Ok(keyspace) => Some(keyspace),
            Err(e) => {
                warn!(
                    "Could not open cache at {}: {}. Continuing without persistence",
                    cache_dir.display(),
                    e
                );
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    /// A store whose collections all live in memory.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    /// Like `get_collection` but falls back to a process-local collection when
    /// the persistent one is unavailable.
    pub fn collection(&self, name: &str) -> Arc<dyn KeyValueCollection> {
        self.get_collection(name, true, true)
            .or_else(|| self.get_collection(name, false, true))
            .unwrap_or_else(|| Arc::new(MemoryCollection::new()))
    }

    /// A collection holding user-entered records. Unlike [`Self::collection`]
    /// this never falls back to memory: records must outlive the process.
    pub fn data_collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>> {
        self.get_collection(name, true, true).ok_or_else(|| {
            anyhow!("Storage for {name} is unavailable; refusing to keep records in memory")
        })
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Some(Arc::clone(existing));
        }

        if !create_if_missing {
            return None;
        }

        let new_collection: Arc<dyn KeyValueCollection> = if persist {
            let partition = self
                .keyspace
                .as_ref()?
                .open_partition(name, PartitionCreateOptions::default())
                .inspect_err(|e| warn!("Could not open partition {}: {}", name, e))
                .ok()?;
            Arc::new(DiskCollection::new(partition))
        } else {
            Arc::new(MemoryCollection::new())
        };

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        Some(Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert(new_collection),
        ))
    }

    fn remove_collection(&self, name: &str) -> bool {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.remove(name).is_some()
    }
}
