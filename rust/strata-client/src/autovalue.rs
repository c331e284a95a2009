use std::future::Future;

use rand::Rng;
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::ActionError;
use crate::schema::{AutoValueSource, FieldSchema, ResourceSchema};

const SHORT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SHORT_ID_SUFFIX_LEN: usize = 5;

/// Generates a fresh 128-bit random id, hex-encoded. Used for both
/// `auto.uuid` resolution and minting request ids.
pub fn fresh_uuid() -> String {
    let mut rng = rand::thread_rng();
    let high: u64 = rng.r#gen();
    let low: u64 = rng.r#gen();
    format!("{high:016x}{low:016x}")
}

/// Builds a short id: one letter prefix plus 5 chars from `[A-Z0-9]`
/// (spec.md §4.5's `auto.<prefix>ShortId` row).
pub fn fresh_short_id(prefix: char) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SHORT_ID_SUFFIX_LEN)
        .map(|_| SHORT_ID_ALPHABET[rng.gen_range(0..SHORT_ID_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

/// Resolves every `autoValue`-declared field of `payload` that is absent
/// from the caller's input, per spec.md §4.5.
///
/// `exists` is an async existence probe used only for `ShortId` fields: on
/// a collision it is retried with a fresh suffix, up to
/// `max_short_id_collision_retries` times, before failing with
/// [`ActionError::AutoValueResolution`] (SPEC_FULL.md §4.5, resolving the
/// short-id-collision Open Question in spec.md §9).
///
/// Resolution is idempotent for every non-random source: re-running it
/// against an already-resolved payload and the same context changes
/// nothing, because every source other than `Uuid`/`ShortId` only fills a
/// field that is still absent.
pub async fn resolve_auto_values<E, F>(
    schema: &ResourceSchema,
    payload: &Value,
    ctx: &RequestContext,
    max_short_id_collision_retries: u32,
    mut exists: impl FnMut(String) -> F,
) -> Result<Value, ActionError>
where
    F: Future<Output = Result<bool, E>>,
{
    let mut object = payload.as_object().cloned().unwrap_or_default();

    for field in &schema.fields {
        if object.contains_key(&field.key) {
            continue;
        }

        if let Some(value) = resolve_field(field, ctx, max_short_id_collision_retries, &mut exists).await? {
            object.insert(field.key.clone(), value);
        } else if let Some(default) = &field.default_value {
            object.insert(field.key.clone(), default.clone());
        } else if field.required {
            return Err(ActionError::AutoValueResolution(field.key.clone()));
        }
    }

    Ok(Value::Object(object))
}

async fn resolve_field<E, F>(
    field: &FieldSchema,
    ctx: &RequestContext,
    max_short_id_collision_retries: u32,
    exists: &mut impl FnMut(String) -> F,
) -> Result<Option<Value>, ActionError>
where
    F: Future<Output = Result<bool, E>>,
{
    let Some(source) = &field.auto_value else {
        return Ok(None);
    };

    let value = match source {
        AutoValueSource::Uuid => Value::String(fresh_uuid()),
        AutoValueSource::Timestamp => Value::String(chrono::Utc::now().to_rfc3339()),
        AutoValueSource::SessionUserId => Value::String(ctx.branch.user_id.clone()),
        AutoValueSource::SessionTenantId => Value::String(ctx.branch.tenant_id.clone()),
        AutoValueSource::SessionCurrentBranchId => Value::String(ctx.branch.current_branch_id.clone()),
        AutoValueSource::Navigation { .. } => {
            // Resolved ahead of time by `apply_navigation_context`, which
            // has access to `DispatchOptions::navigation_context` (not
            // carried on `RequestContext`). Nothing left to do here.
            let _ = ctx;
            return Ok(None);
        }
        AutoValueSource::ShortId { prefix } => {
            return resolve_short_id(*prefix, field, max_short_id_collision_retries, exists)
                .await
                .map(Some);
        }
    };

    Ok(Some(value))
}

async fn resolve_short_id<E, F>(
    prefix: char,
    field: &FieldSchema,
    max_retries: u32,
    exists: &mut impl FnMut(String) -> F,
) -> Result<Value, ActionError>
where
    F: Future<Output = Result<bool, E>>,
{
    for _ in 0..=max_retries {
        let candidate = fresh_short_id(prefix);
        match exists(candidate.clone()).await {
            Ok(true) => continue,
            Ok(false) => return Ok(Value::String(candidate)),
            Err(_) => return Err(ActionError::AutoValueResolution(field.key.clone())),
        }
    }
    Err(ActionError::AutoValueResolution(field.key.clone()))
}

/// Resolves `navigation.<field>` auto-values against an explicit
/// navigation-context map, folded in before `resolve_auto_values` so that
/// the write pipeline (which owns `DispatchOptions::navigation_context`)
/// does not need to special-case a separate resolution pass.
pub fn apply_navigation_context(payload: &mut Value, schema: &ResourceSchema, navigation: &std::collections::HashMap<String, String>) {
    let Some(object) = payload.as_object_mut() else { return };
    for field in &schema.fields {
        if object.contains_key(&field.key) {
            continue;
        }
        if let Some(AutoValueSource::Navigation { field: nav_field }) = &field.auto_value
            && let Some(value) = navigation.get(nav_field)
        {
            object.insert(field.key.clone(), Value::String(value.clone()));
        }
    }
}

/// Merges parent data with an explicit navigation-context map, as used by
/// the junction auto-manager's `shouldAutoCreateJunction` /ancestor-keys
/// check (spec.md §4.8): navigation context wins on key collision, since
/// it is the more specific, caller-supplied value.
pub fn merged_navigation_view(
    parent_data: &Value,
    navigation: &std::collections::HashMap<String, String>,
) -> Map<String, Value> {
    let mut merged = parent_data.as_object().cloned().unwrap_or_default();
    for (key, value) in navigation {
        merged.insert(key.clone(), Value::String(value.clone()));
    }
    merged
}
