use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{snapshot_store::SnapshotStore, storage::StorageResult};

/// Snapshot storage kept in process memory. Lost on restart.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no payload is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn save(&self, key: &str, payload: String) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.insert(key.to_string(), payload);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
