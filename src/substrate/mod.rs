//! Transactional substrate boundary.
//!
//! Everything above this module speaks to storage through the
//! [`store::MapRead`] / [`store::MapWrite`] handle traits and the
//! [`store::CommitStrategy`] commit stream. The in-memory
//! [`store::Substrate`] implements the same contract a replicated host
//! would provide: snapshot-isolated transactions over named byte maps,
//! per-key previous-write sequence numbers, a monotone commit sequence
//! number, and in-order delivery of committed transactions to
//! registered strategies.

pub mod store;

pub use store::{CommitStrategy, MapRead, MapWrite, ReadTx, Snapshot, Substrate, TxId, WriteTx};
