use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;

use strata_key::CompoundKey;

use crate::StorageError;

use super::{Record, StorageBackend};

/// A [`StorageBackend`] that persists each store as a directory of JSON
/// files under a root directory, one file per compound key. Native targets
/// only — there is no filesystem on wasm32, where [`super::MemoryStorageBackend`]
/// (backed by IndexedDB at a higher layer in the browser client) is used
/// instead.
#[derive(Clone)]
pub struct FsStorageBackend {
    root: PathBuf,
}

impl FsStorageBackend {
    /// Opens (creating if necessary) a filesystem-backed database rooted at
    /// `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|error| StorageError::Backend(format!("could not create {root:?}: {error}")))?;
        Ok(Self { root })
    }

    fn store_dir(&self, store: &str) -> PathBuf {
        self.root.join(store)
    }

    fn record_path(&self, store: &str, key: &CompoundKey) -> PathBuf {
        let file_name = format!(
            "{}.{}.json",
            BASE64.encode(key.base_id()),
            BASE64.encode(key.branch_id())
        );
        self.store_dir(store).join(file_name)
    }

    fn key_from_file_name(name: &str) -> Option<CompoundKey> {
        let stem = name.strip_suffix(".json")?;
        let (base_id, branch_id) = stem.split_once('.')?;
        let base_id = String::from_utf8(BASE64.decode(base_id).ok()?).ok()?;
        let branch_id = String::from_utf8(BASE64.decode(branch_id).ok()?).ok()?;
        Some(CompoundKey::new(base_id, branch_id))
    }
}

fn ignore_not_found(error: std::io::Error) -> Result<(), StorageError> {
    if error.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(StorageError::Backend(error.to_string()))
    }
}

#[async_trait]
impl StorageBackend for FsStorageBackend {
    async fn get(&self, store: &str, key: &CompoundKey) -> Result<Option<Record>, StorageError> {
        let path = self.record_path(store, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|error| StorageError::Backend(format!("corrupt record at {path:?}: {error}"))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StorageError::Backend(error.to_string())),
        }
    }

    async fn set(&self, store: &str, key: CompoundKey, record: Record) -> Result<(), StorageError> {
        let dir = self.store_dir(store);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| StorageError::Backend(error.to_string()))?;

        let bytes = serde_json::to_vec(&record)
            .map_err(|error| StorageError::Backend(format!("could not serialize record: {error}")))?;
        tokio::fs::write(self.record_path(store, &key), bytes)
            .await
            .map_err(|error| StorageError::Backend(error.to_string()))
    }

    async fn delete(&self, store: &str, key: &CompoundKey) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.record_path(store, key)).await {
            Ok(()) => Ok(()),
            Err(error) => ignore_not_found(error),
        }
    }

    async fn scan(&self, store: &str) -> Result<Vec<(CompoundKey, Record)>, StorageError> {
        let dir = self.store_dir(store);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StorageError::Backend(error.to_string())),
        };

        let mut rows = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| StorageError::Backend(error.to_string()))?
        {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(key) = Self::key_from_file_name(file_name) else {
                continue;
            };
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|error| StorageError::Backend(error.to_string()))?;
            let record = serde_json::from_slice(&bytes)
                .map_err(|error| StorageError::Backend(format!("corrupt record: {error}")))?;
            rows.push((key, record));
        }

        Ok(rows)
    }

    async fn clear_store(&self, store: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.store_dir(store)).await {
            Ok(()) => Ok(()),
            Err(error) => ignore_not_found(error),
        }
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(error) => ignore_not_found(error)?,
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| StorageError::Backend(error.to_string()))
    }
}

/// Derives the on-disk root directory for a tenant's database, mirroring
/// the `o-<tenantId>` naming used by the browser-side IndexedDB database.
pub fn tenant_root(base_dir: &Path, tenant_id: &str) -> PathBuf {
    base_dir.join(format!("o-{tenant_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn it_round_trips_a_record_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsStorageBackend::open(dir.path()).await.unwrap();
        let key = CompoundKey::new("entity-1", "main");

        backend.set("node", key.clone(), json!({"id": "entity-1"})).await.unwrap();
        let record = backend.get("node", &key).await.unwrap();

        assert_eq!(record, Some(json!({"id": "entity-1"})));
    }

    #[tokio::test]
    async fn it_scans_every_record_in_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsStorageBackend::open(dir.path()).await.unwrap();

        backend
            .set("node", CompoundKey::new("entity-1", "main"), json!({"n": 1}))
            .await
            .unwrap();
        backend
            .set("node", CompoundKey::new("entity-2", "main"), json!({"n": 2}))
            .await
            .unwrap();

        let rows = backend.scan("node").await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn it_treats_missing_store_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsStorageBackend::open(dir.path()).await.unwrap();
        assert!(backend.scan("nope").await.unwrap().is_empty());
        assert_eq!(backend.get("nope", &CompoundKey::new("a", "b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn it_clears_a_single_store_without_touching_others() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsStorageBackend::open(dir.path()).await.unwrap();

        backend
            .set("node", CompoundKey::new("entity-1", "main"), json!({}))
            .await
            .unwrap();
        backend
            .set("process", CompoundKey::new("entity-2", "main"), json!({}))
            .await
            .unwrap();

        backend.clear_store("node").await.unwrap();

        assert!(backend.scan("node").await.unwrap().is_empty());
        assert_eq!(backend.scan("process").await.unwrap().len(), 1);
    }
}
