#![warn(missing_docs)]

//! A durable retry queue for writes that could not be delivered to the
//! remote action router on first attempt.
//!
//! [`SyncQueue`] holds pending writes FIFO-order; [`classify`] decides
//! whether a failed delivery is worth retrying (with backoff) or should be
//! dropped outright. Processing is cooperative and single-threaded by
//! design (spec.md §4.4, §5): only one item is ever in flight.

mod classify;
pub use classify::*;

mod error;
pub use error::*;

mod queue;
pub use queue::*;
