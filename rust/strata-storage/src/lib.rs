#![warn(missing_docs)]

//! A branch-aware, per-tenant durable key-value store, plus the in-process
//! result cache that sits in front of it.
//!
//! The durable side groups records into named stores and addresses them by
//! [`strata_key::CompoundKey`]. A [`DurableStore`] wraps a pluggable
//! [`StorageBackend`] (in-memory, or a filesystem directory on native
//! targets) and is responsible for everything a raw key-value backend does
//! not know about: tenant isolation, branch overlay reads, and the
//! readiness/versioning lifecycle of a tenant's database.
//!
//! ```rust
//! use strata_storage::{DurableStore, MemoryStorageBackend};
//!
//! # async fn example() -> Result<(), strata_storage::StorageError> {
//! let store = DurableStore::new(MemoryStorageBackend::default());
//! store.set_branch_aware("node", serde_json::json!({"id": "n1"}), "main").await?;
//! let record = store.get("node", "n1", "main").await?;
//! assert!(record.is_some());
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod storage;
pub use storage::*;
