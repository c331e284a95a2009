use std::time::Duration;

use url::Url;

/// Tunables for a [`crate::Client`], with defaults matching the literal
/// constants named in spec.md.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a read waits for the durable store to become ready before
    /// bypassing to remote (spec.md §4.2, §4.6: ≈600ms).
    pub durable_readiness_timeout: Duration,
    /// Base URL of the remote action router.
    pub remote_base_url: Url,
    /// Maximum sync-queue retries before an item is dropped as exhausted
    /// (spec.md §4.4: 3).
    pub max_sync_retries: u32,
    /// Base of the exponential backoff applied to FK-violation retries
    /// (spec.md §4.4: 2s).
    pub backoff_base: Duration,
    /// Cap of the exponential backoff applied to FK-violation retries
    /// (spec.md §4.4: 8s).
    pub backoff_cap: Duration,
    /// Capacity, in entries, of the in-process [`strata_storage::MemoryCache`].
    pub memory_cache_capacity: usize,
    /// Bound on short-id collision retries (spec.md §9 Open Question,
    /// resolved in SPEC_FULL.md §4.5: 8).
    pub max_short_id_collision_retries: u32,
}

impl ClientConfig {
    /// Starts a builder rooted at the given remote base URL, with every
    /// other field at its spec-literal default.
    pub fn builder(remote_base_url: Url) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                durable_readiness_timeout: strata_storage::DEFAULT_READINESS_TIMEOUT,
                remote_base_url,
                max_sync_retries: strata_sync::MAX_RETRIES,
                backoff_base: strata_sync::BACKOFF_BASE,
                backoff_cap: strata_sync::BACKOFF_CAP,
                memory_cache_capacity: 512,
                max_short_id_collision_retries: 8,
            },
        }
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Overrides the durable-readiness timeout.
    pub fn durable_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.config.durable_readiness_timeout = timeout;
        self
    }

    /// Overrides the maximum sync-queue retry count.
    pub fn max_sync_retries(mut self, retries: u32) -> Self {
        self.config.max_sync_retries = retries;
        self
    }

    /// Overrides the memory cache's entry capacity.
    pub fn memory_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_cache_capacity = capacity;
        self
    }

    /// Overrides the short-id collision retry bound.
    pub fn max_short_id_collision_retries(mut self, retries: u32) -> Self {
        self.config.max_short_id_collision_retries = retries;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_with_spec_literal_defaults() {
        let config = ClientConfig::builder(Url::parse("https://api.example.com").unwrap()).build();
        assert_eq!(config.durable_readiness_timeout, Duration::from_millis(600));
        assert_eq!(config.max_sync_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert_eq!(config.backoff_cap, Duration::from_secs(8));
    }

    #[test]
    fn it_overrides_fields_through_the_builder() {
        let config = ClientConfig::builder(Url::parse("https://api.example.com").unwrap())
            .max_sync_retries(5)
            .memory_cache_capacity(64)
            .build();
        assert_eq!(config.max_sync_retries, 5);
        assert_eq!(config.memory_cache_capacity, 64);
    }
}
