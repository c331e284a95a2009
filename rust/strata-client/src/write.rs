use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{instrument, warn};

use strata_remote::RemoteClient;
use strata_storage::{DurableStore, MemoryCache, StorageBackend};
use strata_sync::{DeliveryFailure, SyncQueue};

use crate::change_tracker::{self, ChangeKind};
use crate::context::RequestContext;
use crate::schema::ResourceSchema;

/// Write verbs the pipeline understands. Everything else is a custom
/// action the caller dispatches straight to remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerb {
    /// Insert a brand new lineage.
    Create,
    /// Patch an existing lineage, forking it onto the caller's branch if
    /// this is the branch's first write to that lineage.
    Update,
    /// Remove a lineage's row on the caller's branch.
    Delete,
}

/// `{success, data, queued, executionTime}` — the contract for every
/// write, per spec.md §4.7.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Whether the write is considered durable from the caller's point of
    /// view — `true` for both an immediately-confirmed write and one that
    /// was applied optimistically and queued for retry.
    pub success: bool,
    /// The record as it stands after this write: the server's response on
    /// immediate success, or the optimistic local row when queued.
    pub data: Value,
    /// Set when the remote call failed transiently and the write was
    /// handed to the sync queue rather than rolled back.
    pub queued: bool,
    /// Wall-clock time spent serving the write.
    pub execution_time: Duration,
    /// The failure message, present iff `success` is `false`.
    pub error: Option<String>,
}

/// Tracks writes that have been applied to the durable store optimistically
/// but not yet confirmed by the remote endpoint.
///
/// Kept as an explicit side table rather than a `__optimistic` flag stamped
/// onto the record itself (REDESIGN FLAGS, spec.md §9: "track pending rows
/// in a parallel table keyed by their durable key, instead of tagging the
/// row in place") — so a reader never has to know about write-in-flight
/// bookkeeping to interpret a record it gets back.
#[derive(Default)]
pub struct PendingWrites {
    keys: Mutex<HashSet<String>>,
}

impl PendingWrites {
    fn slot(store: &str, id: &str, branch_id: &str) -> String {
        format!("{store}:{id}@{branch_id}")
    }

    /// Marks `(store, id, branch_id)` as having an unconfirmed optimistic
    /// write in flight.
    pub fn mark(&self, store: &str, id: &str, branch_id: &str) {
        self.keys.lock().insert(Self::slot(store, id, branch_id));
    }

    /// Clears the pending marker for `(store, id, branch_id)`.
    pub fn clear(&self, store: &str, id: &str, branch_id: &str) {
        self.keys.lock().remove(&Self::slot(store, id, branch_id));
    }

    /// Whether `(store, id, branch_id)` currently has an unconfirmed write.
    pub fn is_pending(&self, store: &str, id: &str, branch_id: &str) -> bool {
        self.keys.lock().contains(&Self::slot(store, id, branch_id))
    }
}

fn merge_patch(base: &Value, patch: &Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(patch_obj) = patch.as_object() {
        for (key, value) in patch_obj {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Runs the write pipeline: copy-on-write fork, optimistic local apply,
/// remote dispatch, reconciliation, and enqueue-on-transient-failure, per
/// spec.md §4.7.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(durable, cache, remote, sync_queue, pending, payload, options, ctx))]
pub async fn write<B: StorageBackend>(
    schema: &ResourceSchema,
    verb: WriteVerb,
    durable: &DurableStore<B>,
    cache: &MemoryCache,
    remote: &RemoteClient,
    sync_queue: &SyncQueue,
    pending: &PendingWrites,
    action: &str,
    payload: Value,
    options: &crate::context::DispatchOptions,
    ctx: &RequestContext,
) -> WriteOutcome {
    let started = Instant::now();
    let branch_id = ctx.branch.current_branch_id.clone();

    let Some(id) = payload.get("id").and_then(Value::as_str).map(str::to_string) else {
        return WriteOutcome {
            success: false,
            data: Value::Null,
            queued: false,
            execution_time: started.elapsed(),
            error: Some("write payload is missing an id".to_string()),
        };
    };

    let before = if matches!(verb, WriteVerb::Update | WriteVerb::Delete) {
        durable
            .get_branch_aware(&schema.database_key, &id, &ctx.branch)
            .await
            .ok()
            .flatten()
    } else {
        None
    };

    let mut optimistic_record = match verb {
        WriteVerb::Create => payload.clone(),
        WriteVerb::Update => {
            let base = before.clone().unwrap_or_else(|| Value::Object(Default::default()));
            let mut merged = merge_patch(&base, &payload);
            stamp_lineage_if_forking(&mut merged, schema, &before, &branch_id);
            merged
        }
        WriteVerb::Delete => payload.clone(),
    };
    if !matches!(verb, WriteVerb::Delete) {
        stamp_junction_lineage_key(&mut optimistic_record, schema);
    }

    match verb {
        WriteVerb::Delete => {
            if let Err(error) = durable.delete(&schema.database_key, &id, &branch_id).await {
                warn!(action, %error, "optimistic delete failed locally");
            }
        }
        _ => {
            if let Err(error) = durable
                .set_branch_aware(&schema.database_key, optimistic_record.clone(), &branch_id)
                .await
            {
                return WriteOutcome {
                    success: false,
                    data: Value::Null,
                    queued: false,
                    execution_time: started.elapsed(),
                    error: Some(error.to_string()),
                };
            }
        }
    }

    pending.mark(&schema.database_key, &id, &branch_id);
    cache.invalidate(&format!("{}@{}", schema.action_prefix, branch_id));

    let remote_payload = strata_sync::strip_client_only_metadata(&optimistic_record);
    let dispatch_result = remote
        .dispatch(action, Some(remote_payload.clone()), None, Some(&ctx.branch))
        .await;

    match dispatch_result {
        Ok(response) => {
            let after = response.data.clone().unwrap_or_else(|| optimistic_record.clone());
            if !matches!(verb, WriteVerb::Delete)
                && let Err(error) = durable.set_branch_aware(&schema.database_key, after.clone(), &branch_id).await
            {
                warn!(action, %error, "reconciliation write failed locally");
            }
            pending.clear(&schema.database_key, &id, &branch_id);
            cache.invalidate(&format!("{}@{}", schema.action_prefix, branch_id));

            change_tracker::emit_with_options(
                remote,
                schema,
                change_kind_for(verb),
                &id,
                before.as_ref(),
                &after,
                ctx,
                options,
            )
            .await;

            WriteOutcome {
                success: true,
                data: after,
                queued: false,
                execution_time: started.elapsed(),
                error: None,
            }
        }
        Err(transport_error) => {
            let failure: DeliveryFailure = transport_error.into();
            match strata_sync::classify(&failure) {
                strata_sync::Classification::Transient { .. } => {
                    sync_queue.enqueue(action, remote_payload).await;
                    warn!(action, error = %failure.message, "write queued for retry after transient failure");
                    WriteOutcome {
                        success: true,
                        data: optimistic_record,
                        queued: true,
                        execution_time: started.elapsed(),
                        error: Some(failure.message),
                    }
                }
                strata_sync::Classification::Permanent => {
                    rollback(durable, schema, &id, &branch_id, verb, before.clone()).await;
                    pending.clear(&schema.database_key, &id, &branch_id);
                    cache.invalidate(&format!("{}@{}", schema.action_prefix, branch_id));
                    WriteOutcome {
                        success: false,
                        data: before.unwrap_or(Value::Null),
                        queued: false,
                        execution_time: started.elapsed(),
                        error: Some(failure.message),
                    }
                }
            }
        }
    }
}

async fn rollback<B: StorageBackend>(
    durable: &DurableStore<B>,
    schema: &ResourceSchema,
    id: &str,
    branch_id: &str,
    verb: WriteVerb,
    before: Option<Value>,
) {
    let result = match (verb, before) {
        (WriteVerb::Create, _) => durable.delete(&schema.database_key, id, branch_id).await,
        (_, Some(original)) => durable.set_branch_aware(&schema.database_key, original, branch_id).await,
        (_, None) => durable.delete(&schema.database_key, id, branch_id).await,
    };
    if let Err(error) = result {
        warn!(store = %schema.database_key, id, %error, "rollback after permanent failure could not be applied locally");
    }
}

fn stamp_lineage_if_forking(record: &mut Value, schema: &ResourceSchema, before: &Option<Value>, branch_id: &str) {
    let Some(lineage_field) = &schema.lineage_field else { return };
    let Some(before) = before else { return };
    let already_on_branch = before.get("branchId").and_then(Value::as_str) == Some(branch_id);
    if already_on_branch {
        return;
    }
    let Some(obj) = record.as_object_mut() else { return };
    if obj.contains_key(lineage_field) {
        return;
    }
    if let Some(original_id) = before.get("id").and_then(Value::as_str) {
        obj.insert(lineage_field.clone(), Value::String(original_id.to_string()));
    }
}

/// Stamps `__lineageKey` onto a junction record from its foreign-key
/// fields, per spec.md §3: `__lineageKey` is `baseId(fk1):baseId(fk2)`
/// (and so on) so clones of either endpoint resolve to the same overlay
/// group. No-op for non-junction schemas.
fn stamp_junction_lineage_key(record: &mut Value, schema: &ResourceSchema) {
    let Some(obj) = record.as_object() else { return };
    if schema.junction_config.is_none() {
        return;
    }

    let pairs: Vec<(&str, String)> = schema
        .field_mappings
        .iter()
        .filter(|mapping| mapping.target != "branch")
        .filter_map(|mapping| obj.get(&mapping.field).and_then(Value::as_str).map(|value| (mapping.field.as_str(), value.to_string())))
        .collect();

    if pairs.is_empty() {
        return;
    }

    let key = strata_key::junction_lineage_key(&pairs);
    if let Some(obj) = record.as_object_mut() {
        obj.insert("__lineageKey".to_string(), Value::String(key));
    }
}

fn change_kind_for(verb: WriteVerb) -> ChangeKind {
    match verb {
        WriteVerb::Create => ChangeKind::Create,
        WriteVerb::Update => ChangeKind::Update,
        WriteVerb::Delete => ChangeKind::Delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DispatchOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strata_key::BranchContext;
    use strata_storage::MemoryStorageBackend;

    fn ctx() -> RequestContext {
        RequestContext::new(BranchContext::new("feature-1", "main", "tenant-a", "user-1"), "session-1")
    }

    fn harness() -> (DurableStore<MemoryStorageBackend>, MemoryCache, RemoteClient, SyncQueue, PendingWrites) {
        (
            DurableStore::new(MemoryStorageBackend::default()),
            MemoryCache::default(),
            RemoteClient::new(url::Url::parse("https://api.example.com").unwrap(), "tenant-a"),
            SyncQueue::new(),
            PendingWrites::default(),
        )
    }

    #[tokio::test]
    async fn it_applies_a_create_optimistically_even_though_remote_is_unreachable() {
        let (durable, cache, remote, sync_queue, pending) = harness();
        let schema = ResourceSchema::new("node", "node");

        let outcome = write(
            &schema,
            WriteVerb::Create,
            &durable,
            &cache,
            &remote,
            &sync_queue,
            &pending,
            "node.create",
            json!({"id": "n1", "name": "A"}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;

        assert!(outcome.success);
        let stored = durable.get("node", "n1", "feature-1").await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn it_rejects_a_payload_with_no_id() {
        let (durable, cache, remote, sync_queue, pending) = harness();
        let schema = ResourceSchema::new("node", "node");

        let outcome = write(
            &schema,
            WriteVerb::Create,
            &durable,
            &cache,
            &remote,
            &sync_queue,
            &pending,
            "node.create",
            json!({"name": "A"}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;

        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn it_forks_an_update_onto_the_current_branch_lineage() {
        let (durable, cache, remote, sync_queue, pending) = harness();
        durable
            .set_branch_aware("node", json!({"id": "n1", "name": "A", "branchId": "main"}), "main")
            .await
            .unwrap();
        let schema = ResourceSchema::new("node", "node");

        write(
            &schema,
            WriteVerb::Update,
            &durable,
            &cache,
            &remote,
            &sync_queue,
            &pending,
            "node.update",
            json!({"id": "n1", "name": "B"}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;

        let forked = durable.get("node", "n1", "feature-1").await.unwrap().unwrap();
        assert_eq!(forked["originalId"], "n1");
        assert_eq!(forked["name"], "B");
    }

    #[tokio::test]
    async fn it_marks_and_clears_pending_state() {
        let pending = PendingWrites::default();
        pending.mark("node", "n1", "feature-1");
        assert!(pending.is_pending("node", "n1", "feature-1"));
        pending.clear("node", "n1", "feature-1");
        assert!(!pending.is_pending("node", "n1", "feature-1"));
    }
}
