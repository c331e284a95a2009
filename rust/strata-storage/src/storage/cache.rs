use std::collections::HashSet;

use parking_lot::Mutex;
use serde_json::Value;
use sieve_cache::SieveCache;

/// Default capacity of a [`MemoryCache`], in entries.
const DEFAULT_CAPACITY: usize = 512;

/// An in-process map from a read fingerprint to its last successful result.
///
/// The fingerprint (built by [`fingerprint`]) embeds the branch id, so a
/// cache entry can never leak a result from one branch into a read of
/// another. Entries are evicted on capacity pressure (SIEVE, an
/// approximation of LRU) and explicitly on `invalidate`, which drops every
/// entry whose fingerprint contains the given substring — the pattern used
/// after a successful write is the resource/branch prefix, e.g. `"node@main"`.
pub struct MemoryCache {
    entries: Mutex<SieveCache<String, Value>>,
    keys: Mutex<HashSet<String>>,
}

impl MemoryCache {
    /// Builds a cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(SieveCache::new(capacity).expect("capacity must be non-zero")),
            keys: Mutex::new(HashSet::new()),
        }
    }

    /// Looks up a previously cached result.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        self.entries.lock().get(fingerprint).cloned()
    }

    /// Stores a result under a fingerprint.
    pub fn set(&self, fingerprint: impl Into<String>, value: Value) {
        let fingerprint = fingerprint.into();
        self.keys.lock().insert(fingerprint.clone());
        self.entries.lock().insert(fingerprint, value);
    }

    /// Drops every entry whose fingerprint contains `pattern`.
    pub fn invalidate(&self, pattern: &str) {
        let mut keys = self.keys.lock();
        let mut entries = self.entries.lock();
        keys.retain(|key| {
            if key.contains(pattern) {
                entries.remove(key);
                false
            } else {
                true
            }
        });
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.keys.lock().clear();
        *self.entries.lock() = SieveCache::new(self.entries.lock().capacity()).expect("capacity must be non-zero");
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Builds the cache key for an action's result.
///
/// The key is laid out `"<resource>@<branchId>:<action>:<json(data)>"` so
/// that the resource-prefix pattern used by [`MemoryCache::invalidate`]
/// after a successful write (e.g. `"node@main"`) is a literal, contiguous
/// substring of every fingerprint for that resource and branch, regardless
/// of which verb produced the cached result.
pub fn fingerprint(resource: &str, action: &str, data: &Value, branch_id: &str) -> String {
    format!("{resource}@{branch_id}:{action}:{data}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_round_trips_a_cached_value() {
        let cache = MemoryCache::default();
        let key = fingerprint("node", "node.list", &json!({}), "main");
        cache.set(key.clone(), json!([{"id": "n1"}]));
        assert_eq!(cache.get(&key), Some(json!([{"id": "n1"}])));
    }

    #[test]
    fn it_scopes_fingerprints_by_branch() {
        let main = fingerprint("node", "node.list", &json!({}), "main");
        let feature = fingerprint("node", "node.list", &json!({}), "feature-1");
        assert_ne!(main, feature);
    }

    #[test]
    fn it_invalidates_by_substring_pattern() {
        let cache = MemoryCache::default();
        cache.set(fingerprint("node", "node.list", &json!({}), "main"), json!([]));
        cache.set(fingerprint("process", "process.list", &json!({}), "main"), json!([]));

        cache.invalidate("node@main");

        assert_eq!(cache.get(&fingerprint("node", "node.list", &json!({}), "main")), None);
        assert!(cache.get(&fingerprint("process", "process.list", &json!({}), "main")).is_some());
    }

    #[test]
    fn it_clears_every_entry() {
        let cache = MemoryCache::default();
        cache.set(fingerprint("node", "node.list", &json!({}), "main"), json!([]));
        cache.clear();
        assert_eq!(cache.get(&fingerprint("node", "node.list", &json!({}), "main")), None);
    }
}
