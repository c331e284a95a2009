use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use strata_key::CompoundKey;

use crate::StorageError;

use super::{Record, StorageBackend};

/// A [`StorageBackend`] that keeps every store in memory and never
/// persists anything. Used for wasm targets (where there is no filesystem)
/// and for tests.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend {
    stores: Arc<RwLock<HashMap<String, BTreeMap<CompoundKey, Record>>>>,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl StorageBackend for MemoryStorageBackend {
    async fn get(&self, store: &str, key: &CompoundKey) -> Result<Option<Record>, StorageError> {
        let stores = self.stores.read().await;
        Ok(stores.get(store).and_then(|rows| rows.get(key)).cloned())
    }

    async fn set(&self, store: &str, key: CompoundKey, record: Record) -> Result<(), StorageError> {
        let mut stores = self.stores.write().await;
        stores.entry(store.to_string()).or_default().insert(key, record);
        Ok(())
    }

    async fn delete(&self, store: &str, key: &CompoundKey) -> Result<(), StorageError> {
        let mut stores = self.stores.write().await;
        if let Some(rows) = stores.get_mut(store) {
            rows.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, store: &str) -> Result<Vec<(CompoundKey, Record)>, StorageError> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(store)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn clear_store(&self, store: &str) -> Result<(), StorageError> {
        let mut stores = self.stores.write().await;
        stores.remove(store);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut stores = self.stores.write().await;
        stores.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn it_writes_and_reads_a_record() {
        let backend = MemoryStorageBackend::default();
        let key = CompoundKey::new("entity-1", "main");

        backend.set("node", key.clone(), json!({"id": "entity-1"})).await.unwrap();
        let record = backend.get("node", &key).await.unwrap();

        assert_eq!(record, Some(json!({"id": "entity-1"})));
    }

    #[tokio::test]
    async fn it_returns_empty_scan_for_unknown_store() {
        let backend = MemoryStorageBackend::default();
        assert_eq!(backend.scan("nope").await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn it_isolates_stores_from_each_other() {
        let backend = MemoryStorageBackend::default();
        let key = CompoundKey::new("entity-1", "main");

        backend.set("node", key.clone(), json!({"kind": "node"})).await.unwrap();
        backend.set("process", key.clone(), json!({"kind": "process"})).await.unwrap();

        assert_eq!(backend.scan("node").await.unwrap().len(), 1);
        assert_eq!(backend.scan("process").await.unwrap().len(), 1);

        backend.clear_store("node").await.unwrap();
        assert!(backend.scan("node").await.unwrap().is_empty());
        assert_eq!(backend.scan("process").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn it_clears_every_store() {
        let backend = MemoryStorageBackend::default();
        backend
            .set("node", CompoundKey::new("entity-1", "main"), json!({}))
            .await
            .unwrap();
        backend
            .set("process", CompoundKey::new("entity-2", "main"), json!({}))
            .await
            .unwrap();

        backend.clear_all().await.unwrap();

        assert!(backend.scan("node").await.unwrap().is_empty());
        assert!(backend.scan("process").await.unwrap().is_empty());
    }
}
