use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{instrument, warn};

use strata_remote::RemoteClient;
use strata_storage::{DurableStore, LineageKind, MemoryCache, StorageBackend, fingerprint};

use crate::context::{DispatchOptions, RequestContext};
use crate::schema::ResourceSchema;

/// `{success, data, junctions?, cached, executionTime}` — the contract
/// for every read, per spec.md §4.6.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    /// Whether the read produced usable data. Per spec.md §7, reads never
    /// throw, so this is `true` even for an empty-list/"not found" result
    /// — it is only `false` alongside `error` for unexpected failures.
    pub success: bool,
    /// The result payload: a single record, a list, or `Value::Null`.
    pub data: Value,
    /// Side-loaded junction rows, for `.list` reads on well-known parents.
    pub junctions: Option<Value>,
    /// Whether this result came from the memory cache.
    pub cached: bool,
    /// Wall-clock time spent serving the read.
    pub execution_time: Duration,
    /// Set when durable/remote failed unexpectedly and an empty/null
    /// result was substituted rather than propagating the error.
    pub fallback: bool,
    /// The underlying error, if `fallback` is set.
    pub error: Option<String>,
}

impl ReadOutcome {
    fn ok(data: Value, cached: bool, junctions: Option<Value>, started: Instant) -> Self {
        Self {
            success: true,
            data,
            junctions,
            cached,
            execution_time: started.elapsed(),
            fallback: false,
            error: None,
        }
    }

    fn fallback(data: Value, error: impl std::fmt::Display, started: Instant) -> Self {
        Self {
            success: true,
            data,
            junctions: None,
            cached: false,
            execution_time: started.elapsed(),
            fallback: true,
            error: Some(error.to_string()),
        }
    }
}

/// Junction stores side-loaded alongside `.list` reads on these parent
/// resources, per spec.md §4.6's Cache Response side-loading table.
const SIDE_LOADED_LIST_PARENTS: &[(&str, &[&str])] = &[
    ("node", &["nodeProcesses"]),
    ("process", &["nodeProcesses", "processRules"]),
    ("rule", &["processRules", "ruleIgnores"]),
    ("workflow", &["processRules", "ruleIgnores"]),
];

fn side_loaded_junctions_for(resource: &str) -> &'static [&'static str] {
    SIDE_LOADED_LIST_PARENTS
        .iter()
        .find(|(parent, _)| *parent == resource)
        .map(|(_, stores)| *stores)
        .unwrap_or(&[])
}

/// Runs the read pipeline: memory cache → durable (branch-aware) →
/// remote, per spec.md §4.6.
#[instrument(skip(durable, cache, remote, data, options, ctx))]
pub async fn read<B: StorageBackend>(
    schema: &ResourceSchema,
    verb: &str,
    durable: &DurableStore<B>,
    cache: &MemoryCache,
    remote: &RemoteClient,
    action: &str,
    data: Value,
    options: &DispatchOptions,
    ctx: &RequestContext,
) -> ReadOutcome {
    let started = Instant::now();
    let branch_id = &ctx.branch.current_branch_id;
    let key = fingerprint(&schema.action_prefix, action, &data, branch_id);

    if let Some(cached) = cache.get(&key) {
        return ReadOutcome::ok(cached, true, None, started);
    }

    if schema.server_only || options.skip_cache {
        return fetch_remote(schema, remote, action, data, options, ctx, &key, cache, started).await;
    }

    if durable.wait_until_ready().await.is_err() {
        warn!(action, "durable store not ready; bypassing to remote");
        return fetch_remote(schema, remote, action, data, options, ctx, &key, cache, started).await;
    }

    let query_options = options.to_query_options();
    let is_list = verb == "list";
    let requested_id = data.get("id").and_then(Value::as_str);

    let local = if !is_list && let Some(id) = requested_id {
        let record = if schema.not_has_branch_context {
            durable.get_unscoped(&schema.database_key, id).await
        } else {
            durable.get_branch_aware(&schema.database_key, id, &ctx.branch).await
        };
        record.map(|maybe| maybe.unwrap_or(Value::Null))
    } else {
        let kind = if schema.junction_config.is_some() {
            LineageKind::Junction
        } else {
            LineageKind::Entity
        };
        let rows = if schema.not_has_branch_context {
            durable.get_all(&schema.database_key, &query_options).await
        } else {
            durable.get_all_branch_aware(&schema.database_key, &ctx.branch, kind, &query_options).await
        };
        rows.map(Value::Array)
    };

    match local {
        Ok(value) if !is_empty_result(&value) => {
            cache.set(key, value.clone());
            let junctions = if is_list {
                side_load_junctions(schema, durable, &ctx.branch).await
            } else {
                None
            };
            ReadOutcome::ok(value, false, junctions, started)
        }
        Ok(_) => fetch_remote(schema, remote, action, data, options, ctx, &key, cache, started).await,
        Err(error) => {
            warn!(action, %error, "durable read failed unexpectedly; falling back to remote");
            fetch_remote(schema, remote, action, data, options, ctx, &key, cache, started).await
        }
    }
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
async fn fetch_remote<B: StorageBackend>(
    schema: &ResourceSchema,
    remote: &RemoteClient,
    action: &str,
    data: Value,
    options: &DispatchOptions,
    ctx: &RequestContext,
    cache_key: &str,
    cache: &MemoryCache,
    started: Instant,
) -> ReadOutcome {
    let branch_context = (!schema.not_has_branch_context).then_some(&ctx.branch);
    match remote.dispatch(action, Some(data), Some(options_as_json(options)), branch_context).await {
        Ok(response) => {
            let value = response.data.unwrap_or(Value::Null);
            cache.set(cache_key, value.clone());
            ReadOutcome::ok(value, false, response.junctions, started)
        }
        Err(error) => {
            warn!(action, %error, "remote read failed");
            let empty = if action.ends_with(".list") { Value::Array(vec![]) } else { Value::Null };
            ReadOutcome::fallback(empty, error, started)
        }
    }
}

fn options_as_json(options: &DispatchOptions) -> Value {
    serde_json::json!({
        "navigationContext": options.navigation_context,
        "limit": options.limit,
        "offset": options.offset,
    })
}

async fn side_load_junctions<B: StorageBackend>(
    schema: &ResourceSchema,
    durable: &DurableStore<B>,
    ctx: &strata_key::BranchContext,
) -> Option<Value> {
    let stores = side_loaded_junctions_for(&schema.action_prefix);
    if stores.is_empty() {
        return None;
    }

    let mut junctions = serde_json::Map::new();
    for store in stores {
        match durable
            .get_all_branch_aware(store, ctx, LineageKind::Junction, &strata_storage::QueryOptions::default())
            .await
        {
            Ok(rows) => {
                junctions.insert((*store).to_string(), Value::Array(rows));
            }
            Err(error) => {
                warn!(store, %error, "junction side-load store missing; continuing");
            }
        }
    }

    Some(Value::Object(junctions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strata_key::{BranchContext, compound_key};
    use strata_storage::MemoryStorageBackend;

    fn ctx() -> RequestContext {
        RequestContext::new(BranchContext::new("feature-1", "main", "tenant-a", "user-1"), "session-1")
    }

    #[tokio::test]
    async fn it_serves_a_second_identical_list_read_from_cache() {
        let durable = DurableStore::new(MemoryStorageBackend::default());
        durable
            .set("node", serde_json::json!({"id": "n1"}), compound_key("n1", "main"))
            .await
            .unwrap();
        let cache = MemoryCache::default();
        let remote = RemoteClient::new(url::Url::parse("https://api.example.com").unwrap(), "tenant-a");
        let schema = ResourceSchema::new("node", "node");

        let first = read(
            &schema,
            "list",
            &durable,
            &cache,
            &remote,
            "node.list",
            serde_json::json!({}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;
        assert!(!first.cached);

        let second = read(
            &schema,
            "list",
            &durable,
            &cache,
            &remote,
            "node.list",
            serde_json::json!({}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;
        assert!(second.cached);
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn it_resolves_a_single_record_by_id_through_the_overlay() {
        let durable = DurableStore::new(MemoryStorageBackend::default());
        durable
            .set("node", serde_json::json!({"id": "n1", "name": "A"}), compound_key("n1", "main"))
            .await
            .unwrap();
        let cache = MemoryCache::default();
        let remote = RemoteClient::new(url::Url::parse("https://api.example.com").unwrap(), "tenant-a");
        let schema = ResourceSchema::new("node", "node");

        let outcome = read(
            &schema,
            "get",
            &durable,
            &cache,
            &remote,
            "node.get",
            serde_json::json!({"id": "n1"}),
            &DispatchOptions::default(),
            &ctx(),
        )
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.data["name"], "A");
    }
}
