use serde_json::Value;
use tracing::instrument;
use url::Url;

use strata_storage::{DurableStore, MemoryCache, StorageBackend};
use strata_sync::SyncQueue;

use crate::config::ClientConfig;
use crate::context::{DispatchOptions, RequestContext};
use crate::error::ActionError;
use crate::junction::{self, JunctionDispatch};
use crate::read::{self, ReadOutcome};
use crate::schema::{ResourceSchema, SchemaRegistry};
use crate::write::{self, PendingWrites, WriteOutcome, WriteVerb};

/// The result of [`Client::dispatch`], unifying the read and write
/// contracts from spec.md §4.6/§4.7 behind one return type.
#[derive(Debug, Clone)]
pub enum DispatchResult {
    /// A `.list`/`.get` (or other read-shaped) action's result.
    Read(ReadOutcome),
    /// A `.create`/`.update`/`.delete` action's result.
    Write(WriteOutcome),
}

impl DispatchResult {
    /// The result payload, regardless of whether this was a read or write.
    pub fn data(&self) -> &Value {
        match self {
            DispatchResult::Read(outcome) => &outcome.data,
            DispatchResult::Write(outcome) => &outcome.data,
        }
    }

    /// Whether the dispatch is considered successful.
    pub fn success(&self) -> bool {
        match self {
            DispatchResult::Read(outcome) => outcome.success,
            DispatchResult::Write(outcome) => outcome.success,
        }
    }
}

fn split_action(action: &str) -> Option<(&str, &str)> {
    action.split_once('.')
}

/// The public entry point to the branch-aware client data plane: one
/// instance per tenant, constructed fresh on tenant switch rather than
/// mutated in place (REDESIGN FLAGS, spec.md §9: "global singletons" ⇒
/// owned `Client` object, per SPEC_FULL.md §4.10).
pub struct Client<B: StorageBackend> {
    tenant_id: String,
    schemas: SchemaRegistry,
    durable: DurableStore<B>,
    cache: MemoryCache,
    sync_queue: SyncQueue,
    pending: PendingWrites,
    remote: strata_remote::RemoteClient,
    config: ClientConfig,
}

impl<B: StorageBackend> Client<B> {
    /// Builds a client for a single tenant, opening a fresh durable store
    /// over `backend` and a remote transport rooted at `config`'s base URL.
    /// Mirrors `getClient(tenantId, ctx)`'s construction half — the
    /// caller owns the returned instance for as long as it wants the
    /// tenant's handle reused (e.g. behind an `Arc` in its own registry).
    pub fn for_tenant(tenant_id: impl Into<String>, schemas: SchemaRegistry, backend: B, config: ClientConfig) -> Self {
        let tenant_id = tenant_id.into();
        let remote = strata_remote::RemoteClient::new(config.remote_base_url.clone(), tenant_id.clone());
        Self {
            tenant_id,
            schemas,
            durable: DurableStore::with_readiness_timeout(backend, config.durable_readiness_timeout),
            cache: MemoryCache::new(config.memory_cache_capacity),
            sync_queue: SyncQueue::new(),
            pending: PendingWrites::default(),
            remote,
            config,
        }
    }

    /// The tenant this client was opened for.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// This client's schema registry.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Wipes every store for this tenant and clears the memory cache,
    /// without tearing down the `Client` itself — `clearTenantData()`
    /// from spec.md §4.2.
    pub async fn clear_tenant_data(&self) -> Result<(), ActionError> {
        self.durable.clear_tenant_data().await?;
        self.cache.clear();
        Ok(())
    }

    /// Attempts to deliver the oldest pending sync-queue item, if any.
    /// The caller decides when and how often to call this (spec.md §5:
    /// no hidden background threads) — typically from a timer or an
    /// opt-in `strata_common::r#async::spawn` task. Returns
    /// `Err(SyncError::RetriesExhausted)` when the delivered item had
    /// already used up its retry budget, so the caller can decide whether
    /// to alert.
    pub async fn flush_sync_queue(&self) -> Result<Option<strata_sync::SyncItem>, strata_sync::SyncError> {
        self.sync_queue.process_next(&self.remote).await
    }

    /// How many writes are currently waiting for remote delivery.
    pub async fn sync_queue_status(&self) -> strata_sync::QueueStatus {
        self.sync_queue.status().await
    }

    /// Builds a typed method-set handle over a single resource, per
    /// spec.md §4.10's "resource facade" ("generates typed method sets
    /// `{list, get, create, update, delete, ...}`").
    pub fn resource<'a>(&'a self, action_prefix: &str) -> Option<ResourceHandle<'a, B>> {
        self.schemas.get(action_prefix).map(|schema| ResourceHandle { client: self, schema })
    }

    /// Dispatches a single action, per spec.md §4.10: looks up the
    /// resource schema, refuses re-entry through an active
    /// [`crate::context::RecursionGuard`], and routes to the read or
    /// write pipeline based on the verb.
    #[instrument(skip(self, data, options, ctx))]
    pub async fn dispatch(
        &self,
        action: &str,
        data: Value,
        options: DispatchOptions,
        ctx: &RequestContext,
    ) -> Result<DispatchResult, ActionError> {
        if let Some(guard) = &options.recursion_guard
            && guard.parent_action() == action
        {
            return Err(ActionError::RecursionGuard(action.to_string()));
        }

        let (resource, verb) = split_action(action).ok_or_else(|| ActionError::UnknownAction(action.to_string()))?;
        let schema = self.schemas.get(resource).ok_or_else(|| ActionError::UnknownAction(action.to_string()))?;

        match verb {
            "list" | "get" => {
                let outcome = read::read(schema, verb, &self.durable, &self.cache, &self.remote, action, data, &options, ctx).await;
                Ok(DispatchResult::Read(outcome))
            }
            "create" => self.dispatch_create(schema, action, data, options, ctx).await,
            "update" => self.dispatch_write(schema, WriteVerb::Update, action, data, options, ctx).await,
            "delete" => self.dispatch_write(schema, WriteVerb::Delete, action, data, options, ctx).await,
            _ => Err(ActionError::UnknownAction(action.to_string())),
        }
    }

    async fn dispatch_create(
        &self,
        schema: &ResourceSchema,
        action: &str,
        mut data: Value,
        options: DispatchOptions,
        ctx: &RequestContext,
    ) -> Result<DispatchResult, ActionError> {
        crate::autovalue::apply_navigation_context(&mut data, schema, &options.navigation_context);

        let resolved = crate::autovalue::resolve_auto_values(schema, &data, ctx, self.config.max_short_id_collision_retries, |candidate| {
            self.durable.exists_any_branch(&schema.database_key, &candidate)
        })
        .await?;

        self.dispatch_write(schema, WriteVerb::Create, action, resolved, options, ctx).await
    }

    async fn dispatch_write(
        &self,
        schema: &ResourceSchema,
        verb: WriteVerb,
        action: &str,
        data: Value,
        options: DispatchOptions,
        ctx: &RequestContext,
    ) -> Result<DispatchResult, ActionError> {
        let target_id = data.get("id").and_then(Value::as_str).map(str::to_string);

        let outcome = write::write(
            schema,
            verb,
            &self.durable,
            &self.cache,
            &self.remote,
            &self.sync_queue,
            &self.pending,
            action,
            data,
            &options,
            ctx,
        )
        .await;

        if outcome.success && options.recursion_guard.is_none() {
            match verb {
                WriteVerb::Create => {
                    junction::auto_create(&self.schemas, self, schema, &outcome.data, &options.navigation_context, ctx).await;
                }
                WriteVerb::Update => {
                    junction::auto_update(&self.schemas, &self.durable, self, schema, &outcome.data, ctx).await;
                }
                WriteVerb::Delete => {
                    if let Some(id) = target_id {
                        junction::auto_delete(&self.schemas, &self.durable, self, schema, &id, ctx).await;
                    }
                }
            }
        }

        Ok(DispatchResult::Write(outcome))
    }
}

#[async_trait::async_trait]
impl<B: StorageBackend> JunctionDispatch for Client<B> {
    async fn dispatch_guarded(
        &self,
        action: &str,
        data: Value,
        options: DispatchOptions,
        ctx: &RequestContext,
    ) -> Result<Value, ActionError> {
        self.dispatch(action, data, options, ctx).await.map(|result| result.data().clone())
    }
}

/// A typed method set over a single resource, generated from its schema
/// (spec.md §4.10). Every method ultimately calls
/// [`Client::dispatch`].
pub struct ResourceHandle<'a, B: StorageBackend> {
    client: &'a Client<B>,
    schema: &'a ResourceSchema,
}

impl<'a, B: StorageBackend> ResourceHandle<'a, B> {
    /// Dispatches `<resource>.list`.
    pub async fn list(&self, filters: Value, options: DispatchOptions, ctx: &RequestContext) -> Result<DispatchResult, ActionError> {
        self.client.dispatch(&format!("{}.list", self.schema.action_prefix), filters, options, ctx).await
    }

    /// Dispatches `<resource>.get`.
    pub async fn get(&self, id: impl Into<String>, ctx: &RequestContext) -> Result<DispatchResult, ActionError> {
        let data = serde_json::json!({"id": id.into()});
        self.client
            .dispatch(&format!("{}.get", self.schema.action_prefix), data, DispatchOptions::default(), ctx)
            .await
    }

    /// Dispatches `<resource>.create`.
    pub async fn create(&self, data: Value, options: DispatchOptions, ctx: &RequestContext) -> Result<DispatchResult, ActionError> {
        self.client.dispatch(&format!("{}.create", self.schema.action_prefix), data, options, ctx).await
    }

    /// Dispatches `<resource>.update`.
    pub async fn update(&self, data: Value, options: DispatchOptions, ctx: &RequestContext) -> Result<DispatchResult, ActionError> {
        self.client.dispatch(&format!("{}.update", self.schema.action_prefix), data, options, ctx).await
    }

    /// Dispatches `<resource>.delete`.
    pub async fn delete(&self, id: impl Into<String>, ctx: &RequestContext) -> Result<DispatchResult, ActionError> {
        let data = serde_json::json!({"id": id.into()});
        self.client
            .dispatch(&format!("{}.delete", self.schema.action_prefix), data, DispatchOptions::default(), ctx)
            .await
    }
}
