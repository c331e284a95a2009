use async_trait::async_trait;
use serde_json::Value;
use strata_common::{ConditionalSend, ConditionalSync};
use strata_key::CompoundKey;

use crate::StorageError;

mod memory;
pub use memory::*;

#[cfg(not(target_arch = "wasm32"))]
mod fs;
#[cfg(not(target_arch = "wasm32"))]
pub use fs::*;

/// A JSON record as stored and retrieved from a [`StorageBackend`].
pub type Record = Value;

/// A raw, tenant-scoped key-value substrate that a [`crate::DurableStore`]
/// is built on top of. A backend knows nothing about branches, overlays, or
/// tenants beyond the database name it was opened with — it stores records
/// by `(store name, compound key)` and can enumerate everything in a store.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait StorageBackend: Clone + ConditionalSend + ConditionalSync {
    /// Reads a single record.
    async fn get(&self, store: &str, key: &CompoundKey) -> Result<Option<Record>, StorageError>;

    /// Writes a single record, replacing any existing value at `key`.
    async fn set(&self, store: &str, key: CompoundKey, record: Record) -> Result<(), StorageError>;

    /// Deletes a record. Deleting a key that does not exist is not an error.
    async fn delete(&self, store: &str, key: &CompoundKey) -> Result<(), StorageError>;

    /// Returns every record in a store. A store that was never written to
    /// returns an empty vector rather than an error.
    async fn scan(&self, store: &str) -> Result<Vec<(CompoundKey, Record)>, StorageError>;

    /// Drops every record in a single store.
    async fn clear_store(&self, store: &str) -> Result<(), StorageError>;

    /// Drops every record in every store, as when a tenant calls
    /// `clearTenantData()` or the schema version is bumped.
    async fn clear_all(&self) -> Result<(), StorageError>;
}
