use std::time::Duration;

use crate::DeliveryFailure;

/// Exponential backoff base for FK-constraint-related transient failures,
/// per spec.md §4.4.
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);
/// Cap on the exponential backoff for FK-constraint-related failures.
pub const BACKOFF_CAP: Duration = Duration::from_secs(8);
/// Maximum number of retries before an item is dropped regardless of
/// classification.
pub const MAX_RETRIES: u32 = 3;

const PERMANENT_STATUS_CODES: [u16; 5] = [400, 401, 403, 404, 405];
const FK_VIOLATION_SUBSTRING: &str = "Foreign key constraint violated";
const ALREADY_EXISTS_SUBSTRING: &str = "already exists";
const RECORD_NOT_FOUND_SUBSTRING: &str = "Record to update/delete not found";

/// How [`classify`] advises the sync queue to treat a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Retry, waiting `backoff` before the next attempt (zero for
    /// immediate retry).
    Transient {
        /// Delay to wait before the next delivery attempt.
        backoff: Duration,
        /// Whether `backoff` should grow with the item's retry count (per
        /// [`exponential_backoff`]) rather than stay flat across retries.
        /// Set for FK-constraint-violation failures; clear for every other
        /// transient cause, which retries immediately regardless of how
        /// many times it has already been attempted.
        exponential: bool,
    },
    /// Never retry; drop the item and log the failure.
    Permanent,
}

/// Classifies a delivery failure as transient (worth retrying, with
/// backoff) or permanent (drop immediately), per the rules in spec.md
/// §4.4:
///
/// - Unique-constraint violations, 4xx client errors, 409 conflicts
///   containing "already exists", schema/validation failures, and "Record
///   to update/delete not found" are permanent.
/// - Everything else — network failures, 5xx, and FK-constraint
///   violations encountered during eventual consistency — is transient.
///   FK-constraint violations back off exponentially (base 2s, cap 8s);
///   everything else transient retries immediately.
pub fn classify(failure: &DeliveryFailure) -> Classification {
    if failure.message.contains(RECORD_NOT_FOUND_SUBSTRING) {
        return Classification::Permanent;
    }

    if let Some(status) = failure.status {
        if PERMANENT_STATUS_CODES.contains(&status) {
            return Classification::Permanent;
        }
        if status == 409 && failure.message.contains(ALREADY_EXISTS_SUBSTRING) {
            return Classification::Permanent;
        }
    }

    if failure.message.contains(FK_VIOLATION_SUBSTRING) {
        return Classification::Transient { backoff: BACKOFF_BASE, exponential: true };
    }

    Classification::Transient { backoff: Duration::ZERO, exponential: false }
}

/// Computes the exponential backoff for the `attempt`-th FK-violation
/// retry (0-indexed): `BACKOFF_BASE * 2^attempt`, capped at `BACKOFF_CAP`.
pub fn exponential_backoff(attempt: u32) -> Duration {
    let scaled = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_treats_unique_constraint_and_4xx_as_permanent() {
        assert_eq!(classify(&DeliveryFailure::http(400, "bad request")), Classification::Permanent);
        assert_eq!(classify(&DeliveryFailure::http(401, "unauthorized")), Classification::Permanent);
        assert_eq!(classify(&DeliveryFailure::http(404, "missing")), Classification::Permanent);
    }

    #[test]
    fn it_treats_409_already_exists_as_permanent() {
        let failure = DeliveryFailure::http(409, "workflow already exists");
        assert_eq!(classify(&failure), Classification::Permanent);
    }

    #[test]
    fn it_does_not_treat_409_without_already_exists_as_permanent() {
        let failure = DeliveryFailure::http(409, "generic conflict");
        assert_ne!(classify(&failure), Classification::Permanent);
    }

    #[test]
    fn it_treats_record_not_found_as_permanent() {
        let failure = DeliveryFailure::network("Record to update/delete not found");
        assert_eq!(classify(&failure), Classification::Permanent);
    }

    #[test]
    fn it_backs_off_fk_violations() {
        let failure = DeliveryFailure::network("Foreign key constraint violated on processId");
        assert_eq!(
            classify(&failure),
            Classification::Transient { backoff: BACKOFF_BASE, exponential: true }
        );
    }

    #[test]
    fn it_retries_other_network_failures_immediately() {
        let failure = DeliveryFailure::network("connection reset");
        assert_eq!(
            classify(&failure),
            Classification::Transient { backoff: Duration::ZERO, exponential: false }
        );
    }

    #[test]
    fn it_retries_5xx_immediately() {
        let failure = DeliveryFailure::http(503, "service unavailable");
        assert_eq!(
            classify(&failure),
            Classification::Transient { backoff: Duration::ZERO, exponential: false }
        );
    }

    #[test]
    fn it_caps_exponential_backoff() {
        assert_eq!(exponential_backoff(0), Duration::from_secs(2));
        assert_eq!(exponential_backoff(1), Duration::from_secs(4));
        assert_eq!(exponential_backoff(2), Duration::from_secs(8));
        assert_eq!(exponential_backoff(3), BACKOFF_CAP);
    }
}
