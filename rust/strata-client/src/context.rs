use std::collections::HashMap;

pub use strata_key::BranchContext;

/// A one-shot token proving the current call stack frame is processing a
/// junction auto-manager fan-out. Threaded explicitly through
/// [`DispatchOptions`] rather than a string flag in an options bag
/// (REDESIGN FLAGS, spec.md §9: "make it an explicit token in the call
/// stack type instead of a string in a map").
///
/// The dispatcher refuses to invoke the same action a `RecursionGuard` was
/// minted for — see [`crate::client::Client::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionGuard {
    /// The parent action this guard was minted while processing, e.g.
    /// `"process.create"`.
    parent_action: String,
}

impl RecursionGuard {
    /// Mints a guard for `parent_action`.
    pub fn for_action(parent_action: impl Into<String>) -> Self {
        Self { parent_action: parent_action.into() }
    }

    /// The action this guard forbids re-entering.
    pub fn parent_action(&self) -> &str {
        &self.parent_action
    }
}

/// Per-dispatch options, covering every entry in spec.md §6's options
/// table.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Bypass memory and durable layers; go straight to remote.
    pub skip_cache: bool,
    /// Seed values for auto-value resolution and junction auto-creation.
    pub navigation_context: HashMap<String, String>,
    /// Equality filters applied to list reads after overlay.
    pub filters: Vec<(String, serde_json::Value)>,
    /// Sort field/direction applied to list reads after overlay.
    pub sort: Option<(String, strata_storage::SortDirection)>,
    /// Pagination applied to list reads after overlay.
    pub limit: Option<usize>,
    /// Pagination applied to list reads after overlay.
    pub offset: Option<usize>,
    /// Groups related mutations for change tracking.
    pub batch_id: Option<String>,
    /// A machine-facing reason code attached to the change event.
    pub reason: Option<String>,
    /// A human-facing description attached to the change event.
    pub description: Option<String>,
    /// Free-form labels attached to the change event.
    pub tags: Vec<String>,
    /// Present iff this dispatch is junction auto-manager fan-out; forbids
    /// re-entering the action the guard was minted for.
    pub recursion_guard: Option<RecursionGuard>,
}

impl DispatchOptions {
    /// Converts accumulated filters/sort/limit/offset into a
    /// [`strata_storage::QueryOptions`] for the durable store.
    pub fn to_query_options(&self) -> strata_storage::QueryOptions {
        strata_storage::QueryOptions {
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// The immutable request-scoped context threaded through every dispatch:
/// tenant, branch, user, dispatch options, and navigation context
/// (REDESIGN FLAGS, spec.md §9: "pass an immutable `RequestContext` through
/// every call rather than threading globals").
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The branch/tenant/user this request operates under.
    pub branch: BranchContext,
    /// A per-dispatch correlation id, attached to change events.
    pub request_id: String,
    /// A per-session correlation id, attached to change events.
    pub session_id: String,
}

impl RequestContext {
    /// Builds a request context, minting a fresh request id.
    pub fn new(branch: BranchContext, session_id: impl Into<String>) -> Self {
        Self {
            branch,
            request_id: crate::autovalue::fresh_uuid(),
            session_id: session_id.into(),
        }
    }
}
