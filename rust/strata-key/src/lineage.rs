use serde_json::Value;

/// Prefix shared by every lineage foreign-key field, e.g. `originalNodeId`.
const LINEAGE_FIELD_PREFIX: &str = "original";
/// Suffix shared by every lineage foreign-key field.
const LINEAGE_FIELD_SUFFIX: &str = "Id";
/// The canonical, resource-agnostic lineage field.
const LINEAGE_FIELD_CANONICAL: &str = "originalId";

/// Derives a record's base (lineage-root) id.
///
/// Checks `originalId` first, then any field matching `original<X>Id`
/// (scanned in key order, which for a JSON object is alphabetical), and
/// finally falls back to the record's own `id`. A record that has neither a
/// lineage field nor an `id` has no base id.
pub fn base_id(record: &Value) -> Option<String> {
    let obj = record.as_object()?;

    if let Some(id) = obj.get(LINEAGE_FIELD_CANONICAL).and_then(Value::as_str) {
        return Some(id.to_string());
    }

    for (field, value) in obj {
        if field == LINEAGE_FIELD_CANONICAL {
            continue;
        }
        if is_lineage_field(field)
            && let Some(id) = value.as_str()
        {
            return Some(id.to_string());
        }
    }

    obj.get("id").and_then(Value::as_str).map(str::to_string)
}

fn is_lineage_field(field: &str) -> bool {
    field.len() > LINEAGE_FIELD_PREFIX.len() + LINEAGE_FIELD_SUFFIX.len()
        && field.starts_with(LINEAGE_FIELD_PREFIX)
        && field.ends_with(LINEAGE_FIELD_SUFFIX)
}

/// Composes a junction record's lineage key from the base ids of the
/// entities it references.
///
/// `parent_base_ids` pairs a foreign-key field name (e.g. `"nodeId"`) with
/// the base id of the entity that field points to. The composite is built
/// from the fields in sorted order so that it is independent of the order
/// the caller happened to extract them in — which field set applies to a
/// given junction store is schema data the caller already holds.
pub fn junction_lineage_key(parent_base_ids: &[(&str, String)]) -> String {
    let mut fields: Vec<&(&str, String)> = parent_base_ids.iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    fields
        .into_iter()
        .map(|(field, id)| format!("{field}:{id}"))
        .collect::<Vec<_>>()
        .join("|")
}
