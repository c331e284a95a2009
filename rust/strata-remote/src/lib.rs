#![warn(missing_docs)]

//! A client for the single JSON POST action endpoint that mediates every
//! read and write this data plane cannot serve locally.
//!
//! [`RemoteClient`] also implements `strata_sync::Deliverer`, so the sync
//! queue can retry a failed write by handing it straight to the same
//! transport used for the original dispatch.

mod error;
pub use error::*;

mod transport;
pub use transport::*;

mod types;
pub use types::*;
