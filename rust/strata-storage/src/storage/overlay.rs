use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use strata_key::{BranchContext, CompoundKey, branch_score, tie_break};

/// Direction for [`QueryOptions::sort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Post-overlay shaping applied by `getAll` / `getAllBranchAware`: equality
/// filters, a single-field sort, and offset/limit pagination.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    /// Field-equals-value filters, applied before sorting.
    pub filters: Vec<(String, Value)>,
    /// Field to sort by, and the direction.
    pub sort: Option<(String, SortDirection)>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Number of rows to skip before collecting `limit` rows.
    pub offset: Option<usize>,
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| a.total_cmp(&b))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Applies `filters`, `sort`, and `offset`/`limit` to an already-resolved
/// row set, in that order.
pub fn apply_query_options(mut rows: Vec<Value>, options: &QueryOptions) -> Vec<Value> {
    if !options.filters.is_empty() {
        rows.retain(|row| {
            options
                .filters
                .iter()
                .all(|(field, expected)| row.get(field) == Some(expected))
        });
    }

    if let Some((field, direction)) = &options.sort {
        rows.sort_by(|a, b| {
            let ordering = compare_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            );
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    let offset = options.offset.unwrap_or(0);
    let rows = if offset >= rows.len() {
        Vec::new()
    } else {
        rows.split_off(offset)
    };

    match options.limit {
        Some(limit) => rows.into_iter().take(limit).collect(),
        None => rows,
    }
}

/// Resolves the branch overlay over a raw row set read from a single store.
///
/// `group_key` computes the lineage grouping key for a candidate record —
/// `baseId` for ordinary entities, the junction's composite lineage key for
/// junction stores. This is the central read contract described for
/// [`crate::DurableStore`]'s `getAllBranchAware`:
///
/// 1. Candidate set = rows whose branch is the current or default branch.
/// 2. If the caller is on the default branch, only default-branch rows
///    survive (there is nothing left to overlay).
/// 3. Otherwise, group candidates by lineage and keep the highest-scoring
///    row per group, breaking ties deterministically.
pub fn resolve_overlay(
    rows: Vec<(CompoundKey, Value)>,
    ctx: &BranchContext,
    group_key: impl Fn(&Value) -> Option<String>,
) -> Vec<Value> {
    let candidates: Vec<(String, Value)> = rows
        .into_iter()
        .filter_map(|(key, mut record)| {
            let branch_id = key.branch_id().to_string();
            if branch_id != ctx.current_branch_id && branch_id != ctx.default_branch_id {
                return None;
            }
            if let Some(obj) = record.as_object_mut() {
                obj.insert("branchId".to_string(), Value::String(branch_id.clone()));
            }
            Some((branch_id, record))
        })
        .collect();

    if ctx.is_on_default_branch() {
        return candidates
            .into_iter()
            .filter(|(branch_id, _)| branch_id == &ctx.default_branch_id)
            .map(|(_, record)| record)
            .collect();
    }

    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for (_, record) in candidates {
        let key = group_key(&record).unwrap_or_default();
        groups.entry(key).or_default().push(record);
    }

    let mut winners: Vec<Value> = groups
        .into_values()
        .filter_map(|mut group| {
            group.sort_by(|a, b| {
                let score_a = branch_score(a.get("branchId").and_then(Value::as_str).unwrap_or(""), ctx);
                let score_b = branch_score(b.get("branchId").and_then(Value::as_str).unwrap_or(""), ctx);
                score_b.cmp(&score_a).then_with(|| tie_break(a, b))
            });
            group.into_iter().next()
        })
        .collect();

    // Deterministic base ordering for callers that don't request a sort.
    winners.sort_by(|a, b| compare_values(a.get("id").unwrap_or(&Value::Null), b.get("id").unwrap_or(&Value::Null)));
    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> BranchContext {
        BranchContext::new("feature-1", "main", "tenant-a", "user-1")
    }

    #[test]
    fn it_keeps_only_default_rows_when_on_default_branch() {
        let default_ctx = BranchContext::new("main", "main", "tenant-a", "user-1");
        let rows = vec![
            (CompoundKey::new("n1", "main"), json!({"id": "n1"})),
            (CompoundKey::new("n1", "other"), json!({"id": "n1-other"})),
        ];

        let result = resolve_overlay(rows, &default_ctx, |r| r.get("id").and_then(Value::as_str).map(str::to_string));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["id"], "n1");
    }

    #[test]
    fn it_prefers_current_branch_copy_over_default() {
        let rows = vec![
            (
                CompoundKey::new("n1", "main"),
                json!({"id": "n1", "updatedAt": "2024-01-01T00:00:00Z"}),
            ),
            (
                CompoundKey::new("n1", "feature-1"),
                json!({"id": "n1", "updatedAt": "2024-01-02T00:00:00Z"}),
            ),
        ];

        let result = resolve_overlay(rows, &ctx(), |r| r.get("id").and_then(Value::as_str).map(str::to_string));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["branchId"], "feature-1");
    }

    #[test]
    fn it_excludes_rows_outside_current_and_default_branches() {
        let rows = vec![(CompoundKey::new("n1", "someone-elses-branch"), json!({"id": "n1"}))];
        let result = resolve_overlay(rows, &ctx(), |r| r.get("id").and_then(Value::as_str).map(str::to_string));
        assert!(result.is_empty());
    }

    #[test]
    fn it_never_returns_two_rows_from_the_same_lineage() {
        let rows = vec![
            (CompoundKey::new("n1", "main"), json!({"id": "n1"})),
            (CompoundKey::new("n1", "feature-1"), json!({"id": "n1"})),
            (CompoundKey::new("n2", "main"), json!({"id": "n2"})),
        ];
        let result = resolve_overlay(rows, &ctx(), |r| r.get("id").and_then(Value::as_str).map(str::to_string));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn it_applies_filters_sort_and_pagination() {
        let rows = vec![
            json!({"id": "a", "kind": "node", "priority": 2}),
            json!({"id": "b", "kind": "node", "priority": 1}),
            json!({"id": "c", "kind": "other", "priority": 3}),
        ];
        let options = QueryOptions {
            filters: vec![("kind".to_string(), json!("node"))],
            sort: Some(("priority".to_string(), SortDirection::Asc)),
            limit: Some(1),
            offset: Some(0),
        };
        let result = apply_query_options(rows, &options);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["id"], "b");
    }
}
