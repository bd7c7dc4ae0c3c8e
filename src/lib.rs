//! sealkv - etcd v3 semantics over a transactional key-value substrate.
//!
//! sealkv layers the etcd v3 data model (versioned entries, revisions,
//! leases, conditional transactions) on top of a transactional substrate
//! that supplies snapshot-isolated map transactions, ordered commit
//! notifications, and a monotone commit sequence number used as the
//! revision clock. Consensus, durability, and replication belong to the
//! substrate and are out of scope here; an in-memory substrate with the
//! same contract lives in [`substrate`] so the core can be exercised
//! end to end.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     etcd v3 Request Handlers                    │
//! │   Range │ Put │ DeleteRange │ Txn │ Compact │ Lease Grant/...   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌───────────────────────────────┬─────────────────────────────────┐
//! │     Versioned Record Store    │           Lease Store           │
//! │  create/mod revision, version │     ttl, start_time, expiry     │
//! └───────────────────────────────┴─────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Transactional Substrate                      │
//! │  snapshot-isolated tx │ commit seqno │ ordered commit delivery  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Historical Index                          │
//! │     revision → keys │ key → MVCC value log │ compaction floor   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::error`] - Error taxonomy and gRPC status mapping
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::time`] - Wall-clock abstraction for lease expiry
//! - [`substrate::store`] - Transactional map substrate and commit stream
//! - [`store::kvstore`] - Versioned record store with revision hydration
//! - [`store::lease`] - Lease store (grant/revoke/keepalive)
//! - [`store::index`] - Historical index over committed transactions
//! - [`etcd`] - Request/response types and operation handlers
//!
//! # Key Invariants
//!
//! - **REV-HYDRATE**: `create_revision`/`mod_revision` are hydrated at
//!   read time from the substrate's per-key previous-write sequence
//!   number, never trusted from the persisted record
//! - **IDX-ORDER**: the historical index accepts committed transactions
//!   strictly in sequence order, exactly once
//! - **TXN-ATOMIC**: a transaction's mutations live in one uncommitted
//!   substrate transaction; any sub-operation error aborts all of them
//! - **LEASE-LAZY**: lease expiry is checked on access and swept during
//!   Compact, never by background timers

// Core infrastructure
pub mod core;

// Transactional substrate boundary
pub mod substrate;

// Record, lease, and historical stores
pub mod store;

// etcd v3 surface
pub mod etcd;

// Re-exports for convenience
pub use self::core::{config, error, time};
pub use store::{index, kvstore, lease};
