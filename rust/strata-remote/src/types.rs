use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_key::BranchContext;

/// `{currentBranchId, defaultBranchId, tenantId, userId}` as exchanged with
/// the remote endpoint. Mirrors [`strata_key::BranchContext`] with the
/// wire's camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireBranchContext {
    /// The branch the caller is currently working in.
    #[serde(rename = "currentBranchId")]
    pub current_branch_id: String,
    /// The tenant's default branch.
    #[serde(rename = "defaultBranchId")]
    pub default_branch_id: String,
    /// The tenant this context applies to.
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// The user this context applies to.
    #[serde(rename = "userId")]
    pub user_id: String,
}

impl From<&BranchContext> for WireBranchContext {
    fn from(ctx: &BranchContext) -> Self {
        Self {
            current_branch_id: ctx.current_branch_id.clone(),
            default_branch_id: ctx.default_branch_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            user_id: ctx.user_id.clone(),
        }
    }
}

/// The single JSON POST body sent to the remote action endpoint
/// (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// `"<resource>.<verb>"`.
    pub action: String,
    /// The action's payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Free-form dispatch options (`skipCache`, `navigationContext`,
    /// `filters`, etc).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// The caller's branch context, when the action is branch-scoped.
    #[serde(rename = "branchContext", skip_serializing_if = "Option::is_none")]
    pub branch_context: Option<WireBranchContext>,
}

/// `{branchId}` echoed back by the remote endpoint in `meta`, confirming
/// which branch a write actually landed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseMeta {
    /// The branch the server applied the action against.
    #[serde(rename = "branchId")]
    pub branch_id: Option<String>,
}

/// The body of a successful response from the remote action endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the action succeeded.
    pub success: bool,
    /// The primary result payload — a single record, a list, or absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Side-loaded junction rows keyed by junction store name, returned
    /// alongside `.list` reads on parent resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub junctions: Option<Value>,
    /// Server-side metadata about how the action was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    /// The failure message, present iff `success` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single versioned audit record emitted after a successful mutation,
/// per spec.md §4.9. Sent to the change-log endpoint as
/// `{action: "changeLog.create", data: <ChangeEvent>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// `entity_create` | `entity_update` | `entity_delete`.
    #[serde(rename = "operationType")]
    pub operation_type: String,
    /// `CREATE` | `UPDATE` | `DELETE` | `MERGE` | `ROLLBACK` | `BRANCH_COPY`.
    #[serde(rename = "changeType")]
    pub change_type: String,
    /// The resource's action prefix, e.g. `"node"`.
    #[serde(rename = "entityType")]
    pub entity_type: String,
    /// The mutated record's base id.
    #[serde(rename = "entityId")]
    pub entity_id: String,
    /// The lineage ancestor id, if this record descends from a fork.
    #[serde(rename = "originalEntityId", skip_serializing_if = "Option::is_none")]
    pub original_entity_id: Option<String>,
    /// The durable row prior to the remote call, for `.update`.
    #[serde(rename = "beforeData", skip_serializing_if = "Option::is_none")]
    pub before_data: Option<Value>,
    /// The server's response payload.
    #[serde(rename = "afterData")]
    pub after_data: Value,
    /// Per-field diff between `before_data` and `after_data`.
    #[serde(rename = "fieldChanges")]
    pub field_changes: Vec<FieldChange>,
    /// The branch the mutation landed on.
    #[serde(rename = "branchId")]
    pub branch_id: String,
    /// The tenant the mutation belongs to.
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// The user who issued the mutation.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// A per-session correlation id.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// A per-dispatch correlation id.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Groups related mutations (e.g. a bulk import), if any.
    #[serde(rename = "batchId", skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// A machine-facing reason code, if supplied by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// A human-facing description of the change.
    pub description: String,
    /// Free-form labels attached to the event.
    pub tags: Vec<String>,
}

/// One field's before/after state in a [`ChangeEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    /// The field name.
    pub field: String,
    /// The prior value, absent if the field was newly added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// The new value, absent if the field was deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    /// Whether the field was `added`, `modified`, or `deleted`.
    #[serde(rename = "type")]
    pub kind: FieldChangeKind,
}

/// The kind of change a single [`FieldChange`] represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldChangeKind {
    /// The field was absent before and present after.
    Added,
    /// The field's value differs before and after.
    Modified,
    /// The field was present before and absent after.
    Deleted,
}

/// Computes the per-field diff between two JSON objects for a
/// [`ChangeEvent::field_changes`] list.
pub fn diff_fields(before: &Value, after: &Value) -> Vec<FieldChange> {
    let empty = serde_json::Map::new();
    let before_obj = before.as_object().unwrap_or(&empty);
    let after_obj = after.as_object().unwrap_or(&empty);

    let mut changes = Vec::new();

    for (field, after_value) in after_obj {
        match before_obj.get(field) {
            None => changes.push(FieldChange {
                field: field.clone(),
                from: None,
                to: Some(after_value.clone()),
                kind: FieldChangeKind::Added,
            }),
            Some(before_value) if before_value != after_value => changes.push(FieldChange {
                field: field.clone(),
                from: Some(before_value.clone()),
                to: Some(after_value.clone()),
                kind: FieldChangeKind::Modified,
            }),
            _ => {}
        }
    }

    for (field, before_value) in before_obj {
        if !after_obj.contains_key(field) {
            changes.push(FieldChange {
                field: field.clone(),
                from: Some(before_value.clone()),
                to: None,
                kind: FieldChangeKind::Deleted,
            });
        }
    }

    changes.sort_by(|a, b| a.field.cmp(&b.field));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_diffs_added_modified_and_deleted_fields() {
        let before = json!({"name": "A", "status": "open"});
        let after = json!({"name": "B", "priority": 1});

        let changes = diff_fields(&before, &after);
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().any(|c| c.field == "name" && c.kind == FieldChangeKind::Modified));
        assert!(changes.iter().any(|c| c.field == "priority" && c.kind == FieldChangeKind::Added));
        assert!(changes.iter().any(|c| c.field == "status" && c.kind == FieldChangeKind::Deleted));
    }

    #[test]
    fn it_reports_no_changes_for_identical_objects() {
        let record = json!({"name": "A"});
        assert!(diff_fields(&record, &record).is_empty());
    }
}
