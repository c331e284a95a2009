use std::collections::HashMap;

use serde_json::Value;

/// Where an `autoValue`-declared field's value comes from, per spec.md
/// §4.5's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoValueSource {
    /// A fresh 128-bit random id.
    Uuid,
    /// A one-letter prefix plus 5 chars from `[A-Z0-9]`.
    ShortId {
        /// The single-letter prefix, e.g. `"n"` for nodes.
        prefix: char,
    },
    /// ISO-8601 now.
    Timestamp,
    /// The calling user's id, from the request context.
    SessionUserId,
    /// The calling user's tenant id, from the request context.
    SessionTenantId,
    /// The caller's current branch id, from the request context.
    SessionCurrentBranchId,
    /// A value seeded from the request's navigation context map.
    Navigation {
        /// The navigation-context key to read.
        field: String,
    },
}

impl AutoValueSource {
    /// Parses a source descriptor in the wire format spec.md's table uses
    /// (`"auto.uuid"`, `"auto.nShortId"`, `"session.user.id"`,
    /// `"navigation.nodeId"`, ...).
    pub fn parse(source: &str) -> Option<Self> {
        if source == "auto.uuid" {
            return Some(Self::Uuid);
        }
        if source == "auto.timestamp" {
            return Some(Self::Timestamp);
        }
        if source == "session.user.id" {
            return Some(Self::SessionUserId);
        }
        if source == "session.user.tenantId" {
            return Some(Self::SessionTenantId);
        }
        if source == "session.user.branchContext.currentBranchId" {
            return Some(Self::SessionCurrentBranchId);
        }
        if let Some(field) = source.strip_prefix("navigation.") {
            return Some(Self::Navigation { field: field.to_string() });
        }
        if let Some(rest) = source.strip_prefix("auto.")
            && let Some(prefix) = rest.strip_suffix("ShortId")
            && prefix.chars().count() == 1
        {
            return prefix.chars().next().map(|prefix| Self::ShortId { prefix });
        }
        None
    }
}

/// One field in a [`ResourceSchema`].
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// The field's key in the record payload.
    pub key: String,
    /// Declared JSON-ish type name (informational; the payload itself is
    /// schemaless `serde_json::Value` at the dispatch boundary).
    pub field_type: String,
    /// Whether the field must be present (after auto-value resolution).
    pub required: bool,
    /// Whether the server may send `null`/absent for this field.
    pub nullable: bool,
    /// The generated-value source, if this field is schema-declared
    /// `autoValue`.
    pub auto_value: Option<AutoValueSource>,
    /// A static default applied when the field is absent and has no
    /// `auto_value`.
    pub default_value: Option<Value>,
}

impl FieldSchema {
    /// Builds a plain, non-generated field.
    pub fn new(key: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_type: field_type.into(),
            required: false,
            nullable: false,
            auto_value: None,
            default_value: None,
        }
    }

    /// Marks the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Declares the field as schema-generated from `source`.
    pub fn with_auto_value(mut self, source: AutoValueSource) -> Self {
        self.auto_value = Some(source);
        self
    }

    /// Declares a static default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// A junction field's relation mapping, e.g. `{field: "nodeId", target:
/// "node"}` (spec.md §3 `fieldMappings`).
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// The junction field name.
    pub field: String,
    /// The parent resource this field's value identifies. `"branch"`
    /// targets are excluded from parent-action inference (spec.md §4.8).
    pub target: String,
}

/// A junction schema's auto-creation/update/delete configuration
/// (spec.md §3 `junctionConfig`).
#[derive(Debug, Clone, Default)]
pub struct JunctionConfig {
    /// Whether this junction is auto-created in response to a parent
    /// `.create`.
    pub auto_create_on_parent_create: bool,
    /// Maps a junction field to the source expression used to resolve it
    /// from parent data / navigation context, e.g.
    /// `{"nodeId": "navigation.nodeId"}`.
    pub navigation_context: HashMap<String, String>,
    /// Static defaults applied to every auto-created row of this junction.
    pub defaults: HashMap<String, Value>,
}

/// A secondary index declaration (spec.md §6: "Secondary indexes are
/// declared per resource by name and key path").
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The index's name.
    pub name: String,
    /// The field path the index is built over.
    pub key_path: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A resource's declarative schema — the single source of truth consumed
/// by every component in this crate (spec.md §3).
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// The durable store name this resource's rows live in.
    pub database_key: String,
    /// The stable action-verb namespace, e.g. `"node"`.
    pub action_prefix: String,
    /// This resource's fields.
    pub fields: Vec<FieldSchema>,
    /// If `true`, this resource bypasses the durable store entirely —
    /// every read and write goes straight to remote.
    pub server_only: bool,
    /// If `true`, this resource's rows are not branch-scoped.
    pub not_has_branch_context: bool,
    /// The junction auto-management configuration, if this schema
    /// describes a junction.
    pub junction_config: Option<JunctionConfig>,
    /// Relation field mappings, used to infer parent actions for
    /// junctions that are not well-known.
    pub field_mappings: Vec<FieldMapping>,
    /// Secondary indexes declared for this resource.
    pub indexes: Vec<IndexSchema>,
    /// The lineage field name this resource uses (`originalId`, or a
    /// resource-specific `original<Model>Id`), if it supports
    /// copy-on-write forking. `None` for resources with no branch
    /// history (e.g. junctions, which derive lineage from their foreign
    /// keys instead).
    pub lineage_field: Option<String>,
}

impl ResourceSchema {
    /// Builds a minimal ordinary (non-junction) resource schema.
    pub fn new(database_key: impl Into<String>, action_prefix: impl Into<String>) -> Self {
        Self {
            database_key: database_key.into(),
            action_prefix: action_prefix.into(),
            fields: Vec::new(),
            server_only: false,
            not_has_branch_context: false,
            junction_config: None,
            field_mappings: Vec::new(),
            indexes: Vec::new(),
            lineage_field: Some("originalId".to_string()),
        }
    }

    /// Adds a field declaration.
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares this schema's junction configuration and field mappings.
    pub fn with_junction(mut self, config: JunctionConfig, field_mappings: Vec<FieldMapping>) -> Self {
        self.junction_config = Some(config);
        self.field_mappings = field_mappings;
        self.lineage_field = None;
        self
    }

    /// Marks this resource `serverOnly`.
    pub fn server_only(mut self) -> Self {
        self.server_only = true;
        self
    }

    /// Marks this resource not branch-scoped.
    pub fn not_branch_scoped(mut self) -> Self {
        self.not_has_branch_context = true;
        self
    }

    /// Whether this schema describes a managed junction, per spec.md §4.8:
    /// "a schema is a managed junction iff it has
    /// `junctionConfig.autoCreateOnParentCreate === true`".
    pub fn is_managed_junction(&self) -> bool {
        self.junction_config
            .as_ref()
            .is_some_and(|config| config.auto_create_on_parent_create)
    }

    /// The junction field whose relation target is `parent_entity`, if
    /// any — the field the junction auto-manager stamps with the newly
    /// created parent's id.
    pub fn field_targeting(&self, parent_entity: &str) -> Option<&str> {
        self.field_mappings
            .iter()
            .find(|mapping| mapping.target == parent_entity)
            .map(|mapping| mapping.field.as_str())
    }
}

/// The registry of every known [`ResourceSchema`], keyed by action prefix.
/// Built once per [`crate::Client`] and shared read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    /// Builds a registry from a list of schemas, keyed by their
    /// `action_prefix`.
    pub fn new(schemas: impl IntoIterator<Item = ResourceSchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|schema| (schema.action_prefix.clone(), schema)).collect(),
        }
    }

    /// Looks up a resource's schema by its action prefix.
    pub fn get(&self, action_prefix: &str) -> Option<&ResourceSchema> {
        self.schemas.get(action_prefix)
    }

    /// Iterates every registered schema.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.schemas.values()
    }

    /// Every schema that is a managed junction, per
    /// [`ResourceSchema::is_managed_junction`].
    pub fn managed_junctions(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.iter().filter(|schema| schema.is_managed_junction())
    }
}
