use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use strata_common::r#async::sleep;

use crate::{Classification, DeliveryFailure, SyncError, classify};

/// Upper bound on retries regardless of classification, per spec.md §4.4.
pub use crate::classify::MAX_RETRIES;

/// A single pending write, durably queued until it is delivered or
/// classified as a permanent failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncItem {
    /// Opaque id distinguishing this queue entry from others.
    pub id: String,
    /// The action being retried, e.g. `"node.update"`.
    pub action: String,
    /// The payload that failed to deliver.
    pub data: Value,
    /// How many delivery attempts have already failed.
    pub retry_count: u32,
    /// Milliseconds since the Unix epoch when the item was first enqueued.
    pub timestamp: u128,
}

/// Summary of the queue's current contents, returned by [`SyncQueue::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStatus {
    /// Number of items currently pending delivery.
    pub pending: usize,
}

/// Implemented by whatever actually performs a delivery attempt — in
/// production, `strata-remote`'s transport client; in tests, a stub. Kept
/// as a trait so the queue's retry/backoff/classification logic can be
/// tested without a real network dependency.
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync {
    /// Attempts to deliver one action/data pair. On success, returns the
    /// server's response payload; on failure, a [`DeliveryFailure`] the
    /// queue classifies to decide whether to retry.
    async fn deliver(&self, action: &str, data: &Value) -> Result<Value, DeliveryFailure>;
}

/// Field-name prefixes identifying client-only metadata that must never
/// reach the remote endpoint.
const CLIENT_ONLY_PREFIXES: [&str; 2] = ["_", "__"];
const CLIENT_ONLY_FIELDS: [&str; 1] = ["branchTimestamp"];

/// Strips client-only metadata (fields prefixed `_`/`__`, plus
/// `branchTimestamp`) from a payload before it is sent outbound, per
/// spec.md §4.4.
pub fn strip_client_only_metadata(data: &Value) -> Value {
    let Some(obj) = data.as_object() else {
        return data.clone();
    };
    let cleaned: serde_json::Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| {
            !CLIENT_ONLY_FIELDS.contains(&key.as_str())
                && !CLIENT_ONLY_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(cleaned)
}

/// A durable FIFO of writes awaiting successful remote delivery.
///
/// Processing is single-threaded and cooperative: [`process_next`] takes an
/// internal permit so overlapping calls serialize rather than race, which
/// is the Rust-idiomatic equivalent of the spec's `isProcessing` boolean
/// flag (spec.md §4.4, §5).
pub struct SyncQueue {
    items: Mutex<VecDeque<SyncItem>>,
    processing: Mutex<()>,
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncQueue {
    /// Builds an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            processing: Mutex::new(()),
        }
    }

    /// Appends a new write to the back of the queue.
    pub async fn enqueue(&self, action: impl Into<String>, data: Value) -> SyncItem {
        let item = SyncItem {
            id: random_item_id(),
            action: action.into(),
            data,
            retry_count: 0,
            timestamp: strata_common::now_millis(),
        };
        info!(action = %item.action, id = %item.id, "sync queue: enqueued");
        self.items.lock().await.push_back(item.clone());
        item
    }

    /// Attempts to deliver the item at the front of the queue.
    ///
    /// On success, the item is removed and returned. On failure, it is
    /// classified: a permanent failure drops it (logged, `Ok(None)`); a
    /// transient failure is re-appended to the back of the queue with
    /// `retry_count` incremented, after waiting the backoff the classifier
    /// prescribes (`Ok(None)`) — unless it has already reached
    /// [`MAX_RETRIES`] attempts, in which case it is dropped as exhausted
    /// and [`SyncError::RetriesExhausted`] is returned so the caller can
    /// decide whether to alert. An empty queue is a no-op (`Ok(None)`).
    ///
    /// Re-entrant-safe: concurrent callers serialize on an internal permit
    /// rather than processing the same head item twice.
    pub async fn process_next(&self, deliverer: &dyn Deliverer) -> Result<Option<SyncItem>, SyncError> {
        let _permit = self.processing.lock().await;

        let item = {
            let mut items = self.items.lock().await;
            items.pop_front()
        };
        let Some(item) = item else { return Ok(None) };

        let outbound = strip_client_only_metadata(&item.data);
        match deliverer.deliver(&item.action, &outbound).await {
            Ok(_) => {
                info!(action = %item.action, id = %item.id, "sync queue: delivered");
                Ok(Some(item))
            }
            Err(failure) => {
                self.handle_failure(item, failure).await?;
                Ok(None)
            }
        }
    }

    async fn handle_failure(&self, mut item: SyncItem, failure: DeliveryFailure) -> Result<(), SyncError> {
        match classify(&failure) {
            Classification::Permanent => {
                warn!(action = %item.action, id = %item.id, error = %failure.message, "sync queue: dropping permanent failure");
                Ok(())
            }
            Classification::Transient { .. } if item.retry_count >= MAX_RETRIES => {
                warn!(action = %item.action, id = %item.id, "sync queue: retries exhausted, dropping");
                Err(SyncError::RetriesExhausted(item.id))
            }
            Classification::Transient { backoff, exponential } => {
                let backoff = if exponential { crate::classify::exponential_backoff(item.retry_count) } else { backoff };
                item.retry_count += 1;
                warn!(
                    action = %item.action,
                    id = %item.id,
                    retry_count = item.retry_count,
                    backoff_ms = backoff.as_millis() as u64,
                    "sync queue: retrying after transient failure"
                );
                if !backoff.is_zero() {
                    sleep(backoff).await;
                }
                self.items.lock().await.push_back(item);
                Ok(())
            }
        }
    }

    /// Drops every pending item without attempting delivery.
    pub async fn clear(&self) {
        self.items.lock().await.clear();
    }

    /// Reports how many items are currently pending.
    pub async fn status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.items.lock().await.len(),
        }
    }
}

fn random_item_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: u64 = rng.r#gen();
    format!("sync-{suffix:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails(DeliveryFailure);

    #[async_trait::async_trait]
    impl Deliverer for AlwaysFails {
        async fn deliver(&self, _action: &str, _data: &Value) -> Result<Value, DeliveryFailure> {
            Err(self.0.clone())
        }
    }

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl Deliverer for AlwaysSucceeds {
        async fn deliver(&self, _action: &str, data: &Value) -> Result<Value, DeliveryFailure> {
            Ok(data.clone())
        }
    }

    struct CountingDeliverer {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Deliverer for CountingDeliverer {
        async fn deliver(&self, _action: &str, data: &Value) -> Result<Value, DeliveryFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(data.clone())
        }
    }

    #[tokio::test]
    async fn it_delivers_and_removes_a_successful_item() {
        let queue = SyncQueue::new();
        queue.enqueue("node.create", json!({"id": "n1"})).await;

        let delivered = queue.process_next(&AlwaysSucceeds).await;
        assert!(delivered.unwrap().is_some());
        assert_eq!(queue.status().await.pending, 0);
    }

    #[tokio::test]
    async fn it_drops_permanent_failures_without_retry() {
        let queue = SyncQueue::new();
        queue.enqueue("workflow.create", json!({"id": "w1"})).await;

        let deliverer = AlwaysFails(DeliveryFailure::http(409, "workflow already exists"));
        assert!(queue.process_next(&deliverer).await.unwrap().is_none());
        assert_eq!(queue.status().await.pending, 0);

        // Second status() call still reports zero, per S4.
        assert_eq!(queue.status().await.pending, 0);
    }

    #[tokio::test]
    async fn it_retries_transient_failures_up_to_the_max() {
        let queue = SyncQueue::new();
        queue.enqueue("node.update", json!({"id": "n1"})).await;

        let deliverer = AlwaysFails(DeliveryFailure::network("connection reset"));

        // MAX_RETRIES attempts are retried (re-enqueued); the one after
        // that exhausts the budget and is dropped with RetriesExhausted.
        for _ in 0..MAX_RETRIES {
            assert!(queue.process_next(&deliverer).await.is_ok());
            assert_eq!(queue.status().await.pending, 1);
        }
        let exhausted = queue.process_next(&deliverer).await;
        assert!(matches!(exhausted, Err(SyncError::RetriesExhausted(_))));
        assert_eq!(queue.status().await.pending, 0);
    }

    #[tokio::test]
    async fn it_strips_client_only_fields_before_delivery() {
        let deliverer = CountingDeliverer { calls: AtomicUsize::new(0) };
        let queue = SyncQueue::new();
        queue
            .enqueue(
                "node.create",
                json!({"id": "n1", "__optimistic": true, "_localOnly": 1, "branchTimestamp": 123, "name": "A"}),
            )
            .await;

        struct Capturing<'a>(&'a CountingDeliverer, Mutex<Option<Value>>);

        #[async_trait::async_trait]
        impl Deliverer for Capturing<'_> {
            async fn deliver(&self, action: &str, data: &Value) -> Result<Value, DeliveryFailure> {
                *self.1.lock().await = Some(data.clone());
                self.0.deliver(action, data).await
            }
        }

        let capturing = Capturing(&deliverer, Mutex::new(None));
        queue.process_next(&capturing).await.unwrap();

        let seen = capturing.1.lock().await.clone().unwrap();
        let obj = seen.as_object().unwrap();
        assert!(!obj.contains_key("__optimistic"));
        assert!(!obj.contains_key("_localOnly"));
        assert!(!obj.contains_key("branchTimestamp"));
        assert_eq!(obj.get("name"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn it_preserves_insertion_order() {
        let queue = SyncQueue::new();
        queue.enqueue("node.create", json!({"id": "n1"})).await;
        queue.enqueue("node.create", json!({"id": "n2"})).await;

        let deliverer = CountingDeliverer { calls: AtomicUsize::new(0) };
        let first = queue.process_next(&deliverer).await.unwrap().unwrap();
        assert_eq!(first.data["id"], "n1");
        let second = queue.process_next(&deliverer).await.unwrap().unwrap();
        assert_eq!(second.data["id"], "n2");
    }

    #[tokio::test]
    async fn it_is_a_noop_on_an_empty_queue() {
        let queue = SyncQueue::new();
        assert!(queue.process_next(&AlwaysSucceeds).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn it_clears_pending_items() {
        let queue = SyncQueue::new();
        queue.enqueue("node.create", json!({"id": "n1"})).await;
        queue.clear().await;
        assert_eq!(queue.status().await.pending, 0);
    }
}
