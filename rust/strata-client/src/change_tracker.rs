use serde_json::Value;
use tracing::warn;

use strata_remote::{ChangeEvent, RemoteClient, diff_fields};

use crate::context::{DispatchOptions, RequestContext};
use crate::schema::ResourceSchema;

/// Which mutation a [`ChangeEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new lineage was created.
    Create,
    /// An existing lineage was patched (possibly forking it onto a new
    /// branch in the process).
    Update,
    /// A lineage's row was removed on the caller's branch.
    Delete,
}

impl ChangeKind {
    fn operation_type(self) -> &'static str {
        match self {
            ChangeKind::Create => "entity_create",
            ChangeKind::Update => "entity_update",
            ChangeKind::Delete => "entity_delete",
        }
    }

    fn change_type(self) -> &'static str {
        match self {
            ChangeKind::Create => "CREATE",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// Emits one [`ChangeEvent`] to the remote change-log endpoint and swallows
/// the result, per spec.md §4.9: a change-tracking failure must never fail
/// the write it describes.
#[allow(clippy::too_many_arguments)]
pub async fn emit(
    remote: &RemoteClient,
    schema: &ResourceSchema,
    kind: ChangeKind,
    entity_id: &str,
    before: Option<&Value>,
    after: &Value,
    ctx: &RequestContext,
) {
    emit_with_options(remote, schema, kind, entity_id, before, after, ctx, &DispatchOptions::default()).await
}

/// As [`emit`], but threading batch/reason/description/tags from the
/// dispatch options that produced this mutation.
#[allow(clippy::too_many_arguments)]
pub async fn emit_with_options(
    remote: &RemoteClient,
    schema: &ResourceSchema,
    kind: ChangeKind,
    entity_id: &str,
    before: Option<&Value>,
    after: &Value,
    ctx: &RequestContext,
    options: &DispatchOptions,
) {
    let original_entity_id = strata_key::base_id(after).filter(|base| base != entity_id);
    let field_changes = before.map(|before| diff_fields(before, after)).unwrap_or_default();

    let event = ChangeEvent {
        operation_type: kind.operation_type().to_string(),
        change_type: kind.change_type().to_string(),
        entity_type: schema.action_prefix.clone(),
        entity_id: entity_id.to_string(),
        original_entity_id,
        before_data: before.cloned(),
        after_data: after.clone(),
        field_changes,
        branch_id: ctx.branch.current_branch_id.clone(),
        tenant_id: ctx.branch.tenant_id.clone(),
        user_id: ctx.branch.user_id.clone(),
        session_id: ctx.session_id.clone(),
        request_id: ctx.request_id.clone(),
        batch_id: options.batch_id.clone(),
        reason: options.reason.clone(),
        description: options.description.clone().unwrap_or_default(),
        tags: options.tags.clone(),
    };

    let payload = match serde_json::to_value(&event) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "change tracker: could not serialize change event");
            return;
        }
    };

    if let Err(error) = remote.send_change_log(&payload).await {
        warn!(entity = %schema.action_prefix, entity_id, %error, "change tracker: change-log delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_key::BranchContext;

    fn ctx() -> RequestContext {
        RequestContext::new(BranchContext::new("feature-1", "main", "tenant-a", "user-1"), "session-1")
    }

    #[tokio::test]
    async fn it_swallows_a_delivery_failure_without_panicking() {
        let remote = RemoteClient::new(url::Url::parse("https://unroutable.invalid").unwrap(), "tenant-a");
        let schema = ResourceSchema::new("node", "node");

        emit(
            &remote,
            &schema,
            ChangeKind::Create,
            "n1",
            None,
            &json!({"id": "n1", "name": "A"}),
            &ctx(),
        )
        .await;
    }

    #[test]
    fn it_derives_original_entity_id_only_when_it_differs() {
        let same = json!({"id": "n1"});
        assert_eq!(strata_key::base_id(&same).filter(|base| base != "n1"), None);

        let forked = json!({"id": "n2", "originalId": "n1"});
        assert_eq!(strata_key::base_id(&forked).filter(|base| base != "n2"), Some("n1".to_string()));
    }
}
