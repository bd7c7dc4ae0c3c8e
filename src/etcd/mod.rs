//! etcd v3 surface: request/response types and operation handlers.
//!
//! - [`kv`] - Range, Put, DeleteRange, Compact payloads
//! - [`txn`] - Txn payloads and comparison evaluation
//! - [`lease`] - Lease RPC payloads
//! - [`service`] - The handlers, wired to the substrate and the index

pub mod kv;
pub mod lease;
pub mod service;
pub mod txn;

pub use service::EtcdService;
