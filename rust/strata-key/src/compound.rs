use std::ops::Bound;

/// The native storage key: an ordered pair of `(baseId, branchId)`.
///
/// The two components are kept distinct rather than joined into a single
/// delimited string. Range scans over a durable store's primary index rely
/// on the lexicographic ordering of the pair — collapsing it into one
/// string would make a prefix scan over `baseId` ambiguous whenever a
/// `baseId` happened to be a prefix of another one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompoundKey {
    base_id: String,
    branch_id: String,
}

impl CompoundKey {
    /// Builds a compound key from its two parts.
    ///
    /// Both parts must be non-empty; this is enforced with a `debug_assert!`
    /// rather than a `Result` because a key is only ever constructed from
    /// already-validated identifiers (an empty `baseId` or `branchId` is a
    /// caller bug, not a reachable runtime condition).
    pub fn new(base_id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        let base_id = base_id.into();
        let branch_id = branch_id.into();
        debug_assert!(!base_id.is_empty(), "compound key base id must not be empty");
        debug_assert!(!branch_id.is_empty(), "compound key branch id must not be empty");
        Self { base_id, branch_id }
    }

    /// The base (lineage-root) id component.
    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// The branch id component.
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }
}

/// Builds the native storage key used for a record written under a given
/// branch. Equivalent to [`CompoundKey::new`]; kept as a free function
/// because it mirrors the verb-first naming of the other operations here.
pub fn compound_key(id: impl Into<String>, branch_id: impl Into<String>) -> CompoundKey {
    CompoundKey::new(id, branch_id)
}

/// A sentinel branch id guaranteed to sort after any realistic branch
/// identifier, used as the open upper bound of a prefix scan.
const UPPER_BOUND_SENTINEL: &str = "\u{10FFFF}\u{10FFFF}\u{10FFFF}\u{10FFFF}";

/// A sentinel guaranteed to sort before any non-empty identifier.
const LOWER_BOUND_SENTINEL: &str = "\u{0}";

/// Half-open range over the primary `(baseId, branchId)` index that matches
/// every branch's copy of a single entity.
pub fn range_for_entity(id: &str) -> (Bound<CompoundKey>, Bound<CompoundKey>) {
    (
        Bound::Included(CompoundKey::new(id, LOWER_BOUND_SENTINEL)),
        Bound::Included(CompoundKey::new(id, UPPER_BOUND_SENTINEL)),
    )
}

/// A compound key reordered as `(branchId, baseId)`.
///
/// The durable store's primary index is ordered `(baseId, branchId)`, which
/// makes [`range_for_entity`] a contiguous scan but leaves "every record in
/// branch X" scattered across the index. Backends that need to answer that
/// query contiguously maintain a secondary index keyed by `BranchOrderedKey`
/// instead, and use [`range_for_branch`] to scan it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchOrderedKey {
    branch_id: String,
    base_id: String,
}

impl BranchOrderedKey {
    /// Builds a branch-ordered key from its two parts.
    pub fn new(branch_id: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
            base_id: base_id.into(),
        }
    }

    /// The branch id component.
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    /// The base id component.
    pub fn base_id(&self) -> &str {
        &self.base_id
    }
}

impl From<&CompoundKey> for BranchOrderedKey {
    fn from(key: &CompoundKey) -> Self {
        BranchOrderedKey::new(key.branch_id().to_string(), key.base_id().to_string())
    }
}

/// Half-open range over a `BranchOrderedKey` secondary index that matches
/// every record belonging to a single branch.
pub fn range_for_branch(branch_id: &str) -> (Bound<BranchOrderedKey>, Bound<BranchOrderedKey>) {
    (
        Bound::Included(BranchOrderedKey::new(branch_id, LOWER_BOUND_SENTINEL)),
        Bound::Included(BranchOrderedKey::new(branch_id, UPPER_BOUND_SENTINEL)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_orders_keys_by_base_id_then_branch_id() {
        let a = CompoundKey::new("entity-1", "branch-a");
        let b = CompoundKey::new("entity-1", "branch-b");
        let c = CompoundKey::new("entity-2", "branch-a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn it_scopes_entity_range_to_one_base_id() {
        let (lo, hi) = range_for_entity("entity-1");
        let inside = CompoundKey::new("entity-1", "any-branch");
        let before = CompoundKey::new("entity-0", "zz");
        let after = CompoundKey::new("entity-2", "aa");

        let in_range = |k: &CompoundKey| match (&lo, &hi) {
            (Bound::Included(l), Bound::Included(h)) => k >= l && k <= h,
            _ => unreachable!(),
        };

        assert!(in_range(&inside));
        assert!(!in_range(&before));
        assert!(!in_range(&after));
    }

    #[test]
    fn it_scopes_branch_range_to_one_branch_id() {
        let (lo, hi) = range_for_branch("branch-a");
        let inside = BranchOrderedKey::new("branch-a", "entity-7");
        let other_branch = BranchOrderedKey::new("branch-b", "entity-7");

        let in_range = |k: &BranchOrderedKey| match (&lo, &hi) {
            (Bound::Included(l), Bound::Included(h)) => k >= l && k <= h,
            _ => unreachable!(),
        };

        assert!(in_range(&inside));
        assert!(!in_range(&other_branch));
    }

    #[test]
    fn it_derives_branch_ordered_key_from_compound_key() {
        let key = CompoundKey::new("entity-1", "branch-a");
        let reordered = BranchOrderedKey::from(&key);
        assert_eq!(reordered.branch_id(), "branch-a");
        assert_eq!(reordered.base_id(), "entity-1");
    }
}
