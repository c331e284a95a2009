#![warn(missing_docs)]

//! Compound-key construction, lineage derivation, and branch tie-breaking.
//!
//! Every record that passes through the data plane is addressed by a
//! [`CompoundKey`]: an ordered pair of `(baseId, branchId)` strings. This
//! crate owns the pure, synchronous logic for deriving those keys and for
//! picking a winner when more than one branch's copy of a record is visible
//! at once. None of it touches storage or I/O — it is safe to depend on from
//! both the durable store and the read/write pipelines without creating a
//! cycle.

mod branch;
pub use branch::*;

mod compound;
pub use compound::*;

mod lineage;
pub use lineage::*;
