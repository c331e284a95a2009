use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use strata_storage::{DurableStore, StorageBackend};

use crate::context::{DispatchOptions, RecursionGuard, RequestContext};
use crate::error::ActionError;
use crate::schema::{ResourceSchema, SchemaRegistry};

/// Implemented by the dispatcher so the junction auto-manager can route
/// its fan-out writes through the same action system as every other
/// caller — "never a raw remote call" (spec.md §4.8) — while still
/// letting this module stay ignorant of `Client`'s concrete type.
#[async_trait::async_trait]
pub trait JunctionDispatch: Send + Sync {
    /// Dispatches `action` with `options` (carrying the recursion guard)
    /// and returns the resulting record.
    async fn dispatch_guarded(
        &self,
        action: &str,
        data: Value,
        options: DispatchOptions,
        ctx: &RequestContext,
    ) -> Result<Value, ActionError>;
}

/// `shouldAutoCreateJunction`: true iff every key the junction's
/// `navigationContext` declares is present (non-null) in the merged
/// parent-data/navigation-context view (spec.md §4.8).
fn should_auto_create_junction(schema: &ResourceSchema, merged: &serde_json::Map<String, Value>) -> bool {
    schema
        .junction_config
        .as_ref()
        .is_some_and(|config| config.navigation_context.keys().all(|key| !matches!(merged.get(key), None | Some(Value::Null))))
}

fn build_junction_payload(
    schema: &ResourceSchema,
    merged: &serde_json::Map<String, Value>,
    parent_entity: &str,
    parent_id: &str,
) -> Value {
    let config = schema.junction_config.as_ref().expect("managed junction has a junctionConfig");
    let mut payload = serde_json::Map::new();

    for key in config.navigation_context.keys() {
        if let Some(value) = merged.get(key) {
            payload.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in &config.defaults {
        payload.entry(key.clone()).or_insert_with(|| value.clone());
    }

    if let Some(field) = schema.field_targeting(parent_entity) {
        payload.entry(field.to_string()).or_insert_with(|| Value::String(parent_id.to_string()));
    }

    payload.entry("id".to_string()).or_insert_with(|| Value::String(crate::autovalue::fresh_uuid()));

    Value::Object(payload)
}

/// Runs `junctionConfig.autoCreateOnParentCreate` fan-out after a
/// successful parent `.create`, per spec.md §4.8's Creation algorithm.
/// Every junction is attempted independently; failures are logged and
/// collected rather than aborting the others or the parent write that
/// triggered this.
pub async fn auto_create(
    registry: &SchemaRegistry,
    dispatcher: &dyn JunctionDispatch,
    parent_schema: &ResourceSchema,
    parent_record: &Value,
    navigation_context: &HashMap<String, String>,
    ctx: &RequestContext,
) -> Vec<ActionError> {
    let parent_entity = parent_schema.action_prefix.as_str();
    let Some(parent_id) = parent_record.get("id").and_then(Value::as_str) else {
        return Vec::new();
    };

    let merged = crate::autovalue::merged_navigation_view(parent_record, navigation_context);
    let mut errors = Vec::new();

    for schema in registry.managed_junctions() {
        if schema.field_targeting(parent_entity).is_none() {
            continue;
        }
        if !should_auto_create_junction(schema, &merged) {
            continue;
        }

        let payload = build_junction_payload(schema, &merged, parent_entity, parent_id);
        let action = format!("{}.create", schema.action_prefix);
        let options = DispatchOptions {
            recursion_guard: Some(RecursionGuard::for_action(format!("{parent_entity}.create"))),
            ..Default::default()
        };

        if let Err(error) = dispatcher.dispatch_guarded(&action, payload, options, ctx).await {
            warn!(junction = %schema.action_prefix, parent = parent_entity, %error, "junction auto-create failed");
            errors.push(error);
        }
    }

    errors
}

/// Re-syncs every junction row attached to `parent_id` after a parent
/// `.update`, refreshing whichever of their `navigationContext`-mapped
/// fields the parent record still declares (spec.md §4.8: "update and
/// delete run analogously", resolved via `junction_query_by_parent` per
/// SPEC_FULL.md §4.8).
pub async fn auto_update<B: StorageBackend>(
    registry: &SchemaRegistry,
    durable: &DurableStore<B>,
    dispatcher: &dyn JunctionDispatch,
    parent_schema: &ResourceSchema,
    parent_record: &Value,
    ctx: &RequestContext,
) -> Vec<ActionError> {
    let parent_entity = parent_schema.action_prefix.as_str();
    let Some(parent_id) = parent_record.get("id").and_then(Value::as_str) else {
        return Vec::new();
    };

    let mut errors = Vec::new();

    for schema in registry.managed_junctions() {
        let Some(field) = schema.field_targeting(parent_entity) else { continue };
        let rows = match durable.junction_query_by_parent(&schema.database_key, field, parent_id, &ctx.branch).await {
            Ok(rows) => rows,
            Err(error) => {
                warn!(junction = %schema.action_prefix, %error, "junction auto-update lookup failed");
                errors.push(ActionError::DurableUnavailable(error));
                continue;
            }
        };

        let Some(config) = &schema.junction_config else { continue };
        for row in rows {
            let Some(row_id) = row.get("id").and_then(Value::as_str) else { continue };
            let mut patch = serde_json::Map::new();
            patch.insert("id".to_string(), Value::String(row_id.to_string()));
            for key in config.navigation_context.keys() {
                if let Some(value) = parent_record.get(key) {
                    patch.insert(key.clone(), value.clone());
                }
            }
            if patch.len() <= 1 {
                continue;
            }

            let action = format!("{}.update", schema.action_prefix);
            let options = DispatchOptions {
                recursion_guard: Some(RecursionGuard::for_action(format!("{parent_entity}.update"))),
                ..Default::default()
            };
            if let Err(error) = dispatcher.dispatch_guarded(&action, Value::Object(patch), options, ctx).await {
                warn!(junction = %schema.action_prefix, %error, "junction auto-update failed");
                errors.push(error);
            }
        }
    }

    errors
}

/// Deletes every junction row attached to `parent_id` after a parent
/// `.delete` (spec.md §4.8, `junction_query_by_parent`-based resolution
/// per SPEC_FULL.md §4.8).
pub async fn auto_delete<B: StorageBackend>(
    registry: &SchemaRegistry,
    durable: &DurableStore<B>,
    dispatcher: &dyn JunctionDispatch,
    parent_schema: &ResourceSchema,
    parent_id: &str,
    ctx: &RequestContext,
) -> Vec<ActionError> {
    let parent_entity = parent_schema.action_prefix.as_str();
    let mut errors = Vec::new();

    for schema in registry.managed_junctions() {
        let Some(field) = schema.field_targeting(parent_entity) else { continue };
        let rows = match durable.junction_query_by_parent(&schema.database_key, field, parent_id, &ctx.branch).await {
            Ok(rows) => rows,
            Err(error) => {
                warn!(junction = %schema.action_prefix, %error, "junction auto-delete lookup failed");
                errors.push(ActionError::DurableUnavailable(error));
                continue;
            }
        };

        for row in rows {
            let Some(row_id) = row.get("id").and_then(Value::as_str) else { continue };
            let action = format!("{}.delete", schema.action_prefix);
            let options = DispatchOptions {
                recursion_guard: Some(RecursionGuard::for_action(format!("{parent_entity}.delete"))),
                ..Default::default()
            };
            let payload = serde_json::json!({"id": row_id});
            if let Err(error) = dispatcher.dispatch_guarded(&action, payload, options, ctx).await {
                warn!(junction = %schema.action_prefix, %error, "junction auto-delete failed");
                errors.push(error);
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMapping, JunctionConfig};
    use serde_json::json;
    use std::sync::Mutex;
    use strata_key::BranchContext;
    use strata_storage::MemoryStorageBackend;

    fn ctx() -> RequestContext {
        RequestContext::new(BranchContext::new("feature-1", "main", "tenant-a", "user-1"), "session-1")
    }

    fn node_processes_schema() -> ResourceSchema {
        ResourceSchema::new("nodeProcesses", "nodeProcesses").with_junction(
            JunctionConfig {
                auto_create_on_parent_create: true,
                navigation_context: HashMap::from([("nodeId".to_string(), "navigation.nodeId".to_string())]),
                defaults: HashMap::from([("status".to_string(), json!("active"))]),
            },
            vec![
                FieldMapping { field: "nodeId".to_string(), target: "node".to_string() },
                FieldMapping { field: "processId".to_string(), target: "process".to_string() },
            ],
        )
    }

    struct RecordingDispatcher {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait::async_trait]
    impl JunctionDispatch for RecordingDispatcher {
        async fn dispatch_guarded(
            &self,
            action: &str,
            data: Value,
            _options: DispatchOptions,
            _ctx: &RequestContext,
        ) -> Result<Value, ActionError> {
            self.calls.lock().unwrap().push((action.to_string(), data.clone()));
            Ok(data)
        }
    }

    #[tokio::test]
    async fn it_auto_creates_a_junction_when_its_navigation_keys_are_satisfied() {
        let registry = SchemaRegistry::new([node_processes_schema()]);
        let process_schema = ResourceSchema::new("process", "process");
        let dispatcher = RecordingDispatcher { calls: Mutex::new(Vec::new()) };
        let navigation = HashMap::from([("nodeId".to_string(), "n1".to_string())]);

        let errors = auto_create(
            &registry,
            &dispatcher,
            &process_schema,
            &json!({"id": "p1"}),
            &navigation,
            &ctx(),
        )
        .await;

        assert!(errors.is_empty());
        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "nodeProcesses.create");
        assert_eq!(calls[0].1["nodeId"], "n1");
        assert_eq!(calls[0].1["processId"], "p1");
        assert_eq!(calls[0].1["status"], "active");
    }

    #[tokio::test]
    async fn it_skips_auto_create_when_a_required_navigation_key_is_missing() {
        let registry = SchemaRegistry::new([node_processes_schema()]);
        let process_schema = ResourceSchema::new("process", "process");
        let dispatcher = RecordingDispatcher { calls: Mutex::new(Vec::new()) };

        let errors = auto_create(
            &registry,
            &dispatcher,
            &process_schema,
            &json!({"id": "p1"}),
            &HashMap::new(),
            &ctx(),
        )
        .await;

        assert!(errors.is_empty());
        assert!(dispatcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_deletes_every_junction_row_attached_to_a_deleted_parent() {
        let durable = DurableStore::new(MemoryStorageBackend::default());
        durable
            .set_branch_aware(
                "nodeProcesses",
                json!({"id": "np1", "nodeId": "n1", "processId": "p1", "__lineageKey": "nodeId:n1|processId:p1"}),
                "feature-1",
            )
            .await
            .unwrap();

        let registry = SchemaRegistry::new([node_processes_schema()]);
        let node_schema = ResourceSchema::new("node", "node");
        let dispatcher = RecordingDispatcher { calls: Mutex::new(Vec::new()) };

        let errors = auto_delete(&registry, &durable, &dispatcher, &node_schema, "n1", &ctx()).await;

        assert!(errors.is_empty());
        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "nodeProcesses.delete");
        assert_eq!(calls[0].1["id"], "np1");
    }
}
