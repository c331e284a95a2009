use std::cmp::Ordering;

use serde_json::Value;

/// The ambient branch context every branch-scoped operation is evaluated
/// against: which branch the caller is currently on, which branch is the
/// tenant's default, and whose tenant/user the request belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchContext {
    /// The branch the caller is currently working in.
    pub current_branch_id: String,
    /// The tenant's default branch.
    pub default_branch_id: String,
    /// The tenant this context applies to.
    pub tenant_id: String,
    /// The user this context applies to.
    pub user_id: String,
}

impl BranchContext {
    /// Builds a branch context.
    pub fn new(
        current_branch_id: impl Into<String>,
        default_branch_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            current_branch_id: current_branch_id.into(),
            default_branch_id: default_branch_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Whether the caller's current branch is also the tenant's default.
    ///
    /// When this is true, overlay resolution degenerates: there is only one
    /// branch to consider, so every group in the overlay collapses to its
    /// default/unscoped row.
    pub fn is_on_default_branch(&self) -> bool {
        self.current_branch_id == self.default_branch_id
    }
}

/// Scores a record's branch against a [`BranchContext`] for overlay
/// resolution: `3` for the current branch, `2` for the default branch, `1`
/// for anything else (including records with no branch at all, which
/// callers normalize to the default branch id before scoring).
pub fn branch_score(branch_id: &str, ctx: &BranchContext) -> u8 {
    if branch_id == ctx.current_branch_id {
        3
    } else if branch_id == ctx.default_branch_id {
        2
    } else {
        1
    }
}

fn string_field<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Orders two candidate rows from the same overlay group: `updatedAt`
/// descending, then `createdAt` descending, then `id` ascending. Timestamps
/// are compared as strings, which is correct as long as they are ISO-8601
/// (lexicographic order matches chronological order).
pub fn tie_break(a: &Value, b: &Value) -> Ordering {
    string_field(b, "updatedAt")
        .cmp(string_field(a, "updatedAt"))
        .then_with(|| string_field(b, "createdAt").cmp(string_field(a, "createdAt")))
        .then_with(|| string_field(a, "id").cmp(string_field(b, "id")))
}
