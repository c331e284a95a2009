#![warn(missing_docs)]

//! The action dispatcher and resource facade that every caller of the
//! branch-aware client data plane actually talks to.
//!
//! [`Client`] wires a [`schema::SchemaRegistry`] to a `strata-storage`
//! durable store and memory cache, a `strata-sync` retry queue, and a
//! `strata-remote` transport, then exposes a single [`Client::dispatch`]
//! entry point plus a typed per-resource [`ResourceHandle`] facade over it.
//! Reads go through [`read::read`], writes through [`write::write`], and
//! every successful write triggers the junction auto-manager (`junction`)
//! and the change tracker (`change_tracker`) before returning to the
//! caller.
//!
//! ```rust,no_run
//! # // Talks to a real remote endpoint; not run as part of the test suite.
//! use strata_client::{Client, ClientConfig};
//! use strata_client::context::{DispatchOptions, RequestContext};
//! use strata_client::schema::{FieldSchema, ResourceSchema, SchemaRegistry};
//! use strata_key::BranchContext;
//! use strata_storage::MemoryStorageBackend;
//!
//! # async fn example() -> Result<(), strata_client::ActionError> {
//! let schemas = SchemaRegistry::new([
//!     ResourceSchema::new("node", "node").with_field(FieldSchema::new("id", "string")),
//! ]);
//! let config = ClientConfig::builder(url::Url::parse("https://api.example.com").unwrap()).build();
//! let client = Client::for_tenant("tenant-a", schemas, MemoryStorageBackend::default(), config);
//!
//! let ctx = RequestContext::new(BranchContext::new("main", "main", "tenant-a", "user-1"), "session-1");
//! let outcome = client
//!     .dispatch("node.create", serde_json::json!({"id": "n1", "name": "Build"}), DispatchOptions::default(), &ctx)
//!     .await?;
//! assert!(outcome.success());
//! # Ok(())
//! # }
//! ```

pub mod autovalue;
pub mod change_tracker;
mod client;
pub mod context;
pub mod error;
pub mod junction;
pub mod read;
pub mod schema;
pub mod write;

mod config;

pub use client::{Client, DispatchResult, ResourceHandle};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::ActionError;
