use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, warn};

use strata_key::{BranchContext, CompoundKey, base_id as key_base_id, compound_key};

use crate::StorageError;

use super::{QueryOptions, StorageBackend, apply_query_options, resolve_overlay};

/// How long [`DurableStore::wait_until_ready`] will wait for a backend to
/// become usable before callers must bypass the durable layer and go
/// straight to remote. Matches the ≈600 ms readiness budget in the spec.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_millis(600);

/// Grouping strategy used by [`DurableStore::get_all_branch_aware`] to
/// decide which candidate rows belong to the same overlay lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineageKind {
    /// Group by `baseId` (ordinary entities).
    Entity,
    /// Group by the junction's composite `__lineageKey` field, which the
    /// write pipeline stamps onto every junction row at creation time.
    Junction,
}

fn group_key(kind: LineageKind) -> impl Fn(&Value) -> Option<String> {
    move |record: &Value| match kind {
        LineageKind::Entity => key_base_id(record),
        LineageKind::Junction => record.get("__lineageKey").and_then(Value::as_str).map(str::to_string),
    }
}

/// A branch-aware, per-tenant durable key-value store.
///
/// Wraps a [`StorageBackend`] and adds everything the raw backend does not
/// know about: the branch overlay read contract, a readiness timeout, and
/// the hard-reset versioning/tenant-wipe lifecycle described for the
/// durable store in the spec. One `DurableStore` is opened per tenant; the
/// `strata-client::Client` owns the instance and tears it down (dropping
/// the handle and invalidating the memory cache) on tenant switch.
pub struct DurableStore<B: StorageBackend> {
    backend: B,
    readiness_timeout: Duration,
}

impl<B: StorageBackend> DurableStore<B> {
    /// Wraps a backend with the default readiness timeout.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Wraps a backend with a caller-supplied readiness timeout, for tests
    /// that want to exercise the bypass-to-remote path deterministically.
    pub fn with_readiness_timeout(backend: B, readiness_timeout: Duration) -> Self {
        Self { backend, readiness_timeout }
    }

    /// Waits for the backend to answer a trivial probe, bounded by the
    /// readiness timeout. Returns `Err(StorageError::NotReady)` if the
    /// backend does not respond in time; callers (the read pipeline) treat
    /// that as a signal to bypass the durable layer entirely and go to
    /// remote, per the spec's durable-readiness contract.
    #[instrument(skip(self))]
    pub async fn wait_until_ready(&self) -> Result<(), StorageError> {
        let probe = self.backend.scan("__readiness_probe__");
        match strata_common::r#async::timeout(self.readiness_timeout, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(StorageError::NotReady(self.readiness_timeout)),
        }
    }

    /// Reads a single record by its native compound key. Does not apply
    /// branch overlay — the caller already knows exactly which branch row
    /// they want.
    pub async fn get(&self, store: &str, id: &str, branch_id: &str) -> Result<Option<Value>, StorageError> {
        self.backend.get(store, &compound_key(id, branch_id)).await
    }

    /// Reads a record from a store that is not branch-scoped (spec:
    /// `notHasBranchContext`), addressed by its bare id under a sentinel
    /// branch component.
    pub async fn get_unscoped(&self, store: &str, id: &str) -> Result<Option<Value>, StorageError> {
        self.get(store, id, UNSCOPED_BRANCH).await
    }

    /// Branch-aware single-record read: try the current branch, then the
    /// default branch, then the unscoped key. The first hit wins.
    #[instrument(skip(self, ctx))]
    pub async fn get_branch_aware(
        &self,
        store: &str,
        id: &str,
        ctx: &BranchContext,
    ) -> Result<Option<Value>, StorageError> {
        if let Some(record) = self.get(store, id, &ctx.current_branch_id).await? {
            return Ok(Some(record));
        }
        if ctx.current_branch_id != ctx.default_branch_id
            && let Some(record) = self.get(store, id, &ctx.default_branch_id).await?
        {
            return Ok(Some(record));
        }
        self.get_unscoped(store, id).await
    }

    /// Writes a record under an explicit compound key.
    pub async fn set(&self, store: &str, record: Value, key: CompoundKey) -> Result<(), StorageError> {
        self.backend.set(store, key, record).await
    }

    /// Writes a branch-scoped record, keyed by `(baseId(record), branchId)`.
    pub async fn set_branch_aware(&self, store: &str, record: Value, branch_id: &str) -> Result<(), StorageError> {
        let id = key_base_id(&record).ok_or_else(|| StorageError::Backend("record has no identity".to_string()))?;
        self.set(store, record, compound_key(id, branch_id)).await
    }

    /// Writes every record in `records` under its own `(baseId, branchId)`
    /// key, in order.
    pub async fn set_many(&self, store: &str, records: Vec<Value>, branch_id: &str) -> Result<(), StorageError> {
        for record in records {
            self.set_branch_aware(store, record, branch_id).await?;
        }
        Ok(())
    }

    /// Deletes a single record by its native compound key.
    pub async fn delete(&self, store: &str, id: &str, branch_id: &str) -> Result<(), StorageError> {
        self.backend.delete(store, &compound_key(id, branch_id)).await
    }

    /// Returns every row in a store, completely unfiltered by branch, with
    /// `filters`/`sort`/`offset`/`limit` applied afterward. Used for
    /// `serverOnly` and `notHasBranchContext` resources, which have no
    /// overlay semantics to apply.
    pub async fn get_all(&self, store: &str, options: &QueryOptions) -> Result<Vec<Value>, StorageError> {
        let rows = self.scan_or_empty(store).await?;
        let rows: Vec<Value> = rows.into_iter().map(|(_, record)| record).collect();
        Ok(apply_query_options(rows, options))
    }

    /// The central branch-aware list read: resolves the overlay (one row
    /// per lineage, highest [`strata_key::branch_score`] wins, ties broken
    /// by [`strata_key::tie_break`]) and then applies `filters`/`sort`/
    /// `offset`/`limit`.
    #[instrument(skip(self, ctx, options))]
    pub async fn get_all_branch_aware(
        &self,
        store: &str,
        ctx: &BranchContext,
        kind: LineageKind,
        options: &QueryOptions,
    ) -> Result<Vec<Value>, StorageError> {
        let rows = self.scan_or_empty(store).await?;
        let overlaid = resolve_overlay(rows, ctx, group_key(kind));
        Ok(apply_query_options(overlaid, options))
    }

    /// Overlay-filtered search for a record by a short identifier field
    /// (e.g. a human-facing `shortId` distinct from the primary key),
    /// checked equal against every overlay-winning row.
    pub async fn find_by_id_short(
        &self,
        store: &str,
        short: &str,
        ctx: &BranchContext,
        kind: LineageKind,
    ) -> Result<Option<Value>, StorageError> {
        let rows = self.get_all_branch_aware(store, ctx, kind, &QueryOptions::default()).await?;
        Ok(rows.into_iter().find(|row| row.get("shortId").and_then(Value::as_str) == Some(short)))
    }

    /// Junction-query-by-parent, resolving the Open Question in spec.md
    /// §9 on auto-update/auto-delete: returns every overlay-winning
    /// junction row whose `field` equals `parent_id`, so the junction
    /// auto-manager can locate the rows it needs to update or delete in
    /// response to a parent mutation without a bespoke index per junction.
    pub async fn junction_query_by_parent(
        &self,
        store: &str,
        field: &str,
        parent_id: &str,
        ctx: &BranchContext,
    ) -> Result<Vec<Value>, StorageError> {
        let rows = self
            .get_all_branch_aware(store, ctx, LineageKind::Junction, &QueryOptions::default())
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.get(field).and_then(Value::as_str) == Some(parent_id))
            .collect())
    }

    /// Whether any row exists for `id` under `store` in any branch —
    /// the existence probe the auto-value service uses to detect a short-id
    /// collision before it is committed.
    pub async fn exists_any_branch(&self, store: &str, id: &str) -> Result<bool, StorageError> {
        let rows = self.scan_or_empty(store).await?;
        Ok(rows.iter().any(|(key, _)| key.base_id() == id))
    }

    /// Drops every record in a single store (used when reconciling an
    /// optimistic row against an authoritative one under a different key
    /// shape, or when a resource's schema is dropped).
    pub async fn clear_store(&self, store: &str) -> Result<(), StorageError> {
        self.backend.clear_store(store).await
    }

    /// Wipes every store for this tenant without closing the database —
    /// the `clearTenantData()` operation from spec.md §4.2.
    pub async fn clear_tenant_data(&self) -> Result<(), StorageError> {
        self.backend.clear_all().await
    }

    async fn scan_or_empty(&self, store: &str) -> Result<Vec<(CompoundKey, Value)>, StorageError> {
        match self.backend.scan(store).await {
            Ok(rows) => Ok(rows),
            Err(StorageError::StoreNotFound(_)) => {
                warn!(store, "durable store missing; treating read as empty");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }
}

/// Sentinel branch-id component used for records in non-branch-scoped
/// stores, so every row still fits the backend's `(base_id, branch_id)`
/// native key shape.
pub const UNSCOPED_BRANCH: &str = "__unscoped__";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorageBackend;
    use serde_json::json;

    fn ctx() -> BranchContext {
        BranchContext::new("feature-1", "main", "tenant-a", "user-1")
    }

    #[tokio::test]
    async fn it_round_trips_a_branch_scoped_record() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        let record = json!({"id": "n1", "branchId": "main", "name": "A"});
        store.set_branch_aware("node", record.clone(), "main").await.unwrap();

        let found = store.get("node", "n1", "main").await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn it_falls_back_through_branch_then_default_then_unscoped() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        store
            .set_branch_aware("process", json!({"id": "p1"}), "main")
            .await
            .unwrap();

        let found = store.get_branch_aware("process", "p1", &ctx()).await.unwrap();
        assert_eq!(found.unwrap()["id"], "p1");
    }

    #[tokio::test]
    async fn it_overlays_lists_by_lineage() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        store
            .set("node", json!({"id": "n1", "name": "A"}), compound_key("n1", "main"))
            .await
            .unwrap();
        store
            .set(
                "node",
                json!({"id": "n1", "name": "B"}),
                compound_key("n1", "feature-1"),
            )
            .await
            .unwrap();

        let rows = store
            .get_all_branch_aware("node", &ctx(), LineageKind::Entity, &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "B");
    }

    #[tokio::test]
    async fn it_treats_a_never_written_store_as_empty() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        let rows = store.get_all("nope", &QueryOptions::default()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn it_reports_existence_across_any_branch() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        store
            .set("node", json!({"id": "n1"}), compound_key("n1", "feature-1"))
            .await
            .unwrap();

        assert!(store.exists_any_branch("node", "n1").await.unwrap());
        assert!(!store.exists_any_branch("node", "n2").await.unwrap());
    }

    #[tokio::test]
    async fn it_clears_tenant_data_without_error() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        store.set("node", json!({"id": "n1"}), compound_key("n1", "main")).await.unwrap();
        store.clear_tenant_data().await.unwrap();
        assert!(store.get("node", "n1", "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn it_becomes_ready_quickly_against_the_memory_backend() {
        let store = DurableStore::new(MemoryStorageBackend::default());
        store.wait_until_ready().await.unwrap();
    }
}
