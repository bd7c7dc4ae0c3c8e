//! Historical index over the substrate commit stream.
//!
//! The index subscribes to committed transactions as a
//! [`CommitStrategy`] and maintains two append-only structures:
//!
//! ```text
//!   revisions_to_keys : revision → keys touched at that revision
//!   key_logs          : key → [(revision, value-or-tombstone), ...]
//! ```
//!
//! Each delivery rescans the full record map of the committed snapshot
//! and diffs it against the logs, so indexing cost is O(store size) per
//! commit, not O(delta). Deliveries must arrive in seqno order: a
//! duplicate is dropped with a warning, a gap is an unrecoverable
//! error, since a skipped revision could never be backfilled into the
//! append-only logs.
//!
//! Compaction records a floor below which reads are refused. Indexed
//! history below the floor is retained, not reclaimed.

use crate::core::error::{KvError, KvResult};
use crate::store::kvstore::{KvStore, Value};
use crate::substrate::{CommitStrategy, Snapshot, TxId};
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct LogEntry {
    revision: u64,
    /// `None` records a deletion at this revision.
    value: Option<Value>,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Seqno of the last transaction applied to the index.
    cursor: u64,
    /// Compaction floor; reads strictly below it are refused.
    compacted: u64,
    revisions_to_keys: BTreeMap<u64, Vec<Vec<u8>>>,
    key_logs: BTreeMap<Vec<u8>, Vec<LogEntry>>,
}

impl IndexState {
    fn check_readable(&self, at: u64) -> KvResult<()> {
        if at < self.compacted {
            return Err(KvError::invalid_argument(format!(
                "required revision {} has been compacted (floor {})",
                at, self.compacted
            )));
        }
        if at > self.cursor {
            return Err(KvError::invalid_argument(format!(
                "required revision {} is a future revision (indexed up to {})",
                at, self.cursor
            )));
        }
        Ok(())
    }

    fn value_at(&self, at: u64, key: &[u8]) -> Option<Value> {
        let log = self.key_logs.get(key)?;
        log.iter()
            .rev()
            .find(|entry| entry.revision <= at)
            .and_then(|entry| entry.value.clone())
    }
}

/// Historical index over committed record state.
#[derive(Default)]
pub struct KvIndexer {
    state: Mutex<IndexState>,
}

impl KvIndexer {
    /// Create an empty index at cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seqno of the last indexed transaction.
    pub fn cursor(&self) -> u64 {
        self.state.lock().unwrap().cursor
    }

    /// Current compaction floor.
    pub fn compacted_revision(&self) -> u64 {
        self.state.lock().unwrap().compacted
    }

    /// The record stored under `key` as of revision `at`.
    ///
    /// Returns `None` for a key absent (or deleted) at that revision.
    /// Fails if `at` is below the compaction floor or not indexed yet.
    pub fn get(&self, at: u64, key: &[u8]) -> KvResult<Option<Value>> {
        let state = self.state.lock().unwrap();
        state.check_readable(at)?;
        Ok(state.value_at(at, key))
    }

    /// Records with keys in `[from, to)` as of revision `at`, in key
    /// order. `to = None` means unbounded above.
    pub fn range(
        &self,
        at: u64,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> KvResult<Vec<(Vec<u8>, Value)>> {
        let state = self.state.lock().unwrap();
        state.check_readable(at)?;
        if matches!(to, Some(t) if t <= from) {
            return Ok(Vec::new());
        }
        let upper = match to {
            Some(t) => Bound::Excluded(t),
            None => Bound::Unbounded,
        };
        let mut out = Vec::new();
        for key in state
            .key_logs
            .range::<[u8], _>((Bound::Included(from), upper))
            .map(|(key, _)| key)
        {
            if let Some(value) = state.value_at(at, key) {
                out.push((key.clone(), value));
            }
        }
        Ok(out)
    }

    /// Keys written or deleted at exactly revision `at`.
    pub fn keys_modified_at(&self, at: u64) -> KvResult<Vec<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        state.check_readable(at)?;
        Ok(state
            .revisions_to_keys
            .get(&at)
            .cloned()
            .unwrap_or_default())
    }

    /// Raise the compaction floor to `revision`.
    ///
    /// Re-compacting at the current floor is a no-op; moving the floor
    /// backwards or past the cursor is refused. History below the floor
    /// stays in memory.
    pub fn compact(&self, revision: u64) -> KvResult<()> {
        let mut state = self.state.lock().unwrap();
        if revision < state.compacted {
            return Err(KvError::invalid_argument(format!(
                "revision {} is below the compaction floor {}",
                revision, state.compacted
            )));
        }
        if revision > state.cursor {
            return Err(KvError::invalid_argument(format!(
                "cannot compact at future revision {} (indexed up to {})",
                revision, state.cursor
            )));
        }
        state.compacted = revision;
        info!(revision, "raised compaction floor; indexed history is retained");
        Ok(())
    }
}

impl CommitStrategy for KvIndexer {
    fn name(&self) -> &'static str {
        "kv-index"
    }

    fn next_requested(&self) -> u64 {
        self.state.lock().unwrap().cursor + 1
    }

    fn on_committed(&self, tx_id: TxId, snapshot: &Snapshot) -> KvResult<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let seqno = tx_id.seqno;
        if seqno <= state.cursor {
            warn!(
                seqno,
                cursor = state.cursor,
                "duplicate delivery of already-indexed transaction, dropping"
            );
            return Ok(());
        }
        if seqno > state.cursor + 1 {
            return Err(KvError::SequenceGap {
                expected: state.cursor + 1,
                observed: seqno,
            });
        }

        let mut touched = Vec::new();
        let mut present = HashSet::new();
        let key_logs = &mut state.key_logs;
        KvStore::new(snapshot).foreach(&mut |key, value| {
            present.insert(key.to_vec());
            let log = key_logs.entry(key.to_vec()).or_default();
            let recorded = log
                .last()
                .is_some_and(|entry| entry.value.is_some() && entry.revision == value.mod_revision);
            if !recorded {
                if value.mod_revision == seqno {
                    touched.push(key.to_vec());
                }
                log.push(LogEntry {
                    revision: value.mod_revision,
                    value: Some(value),
                });
            }
            true
        })?;

        // Keys with a live log entry that vanished from the snapshot
        // were deleted by this transaction.
        for (key, log) in key_logs.iter_mut() {
            if !present.contains(key) && log.last().is_some_and(|entry| entry.value.is_some()) {
                log.push(LogEntry {
                    revision: seqno,
                    value: None,
                });
                touched.push(key.clone());
            }
        }

        debug!(seqno, touched = touched.len(), "indexed transaction");
        state.revisions_to_keys.insert(seqno, touched);
        state.cursor = seqno;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::Substrate;
    use std::sync::Arc;

    fn indexed_substrate() -> (Substrate, Arc<KvIndexer>) {
        let substrate = Substrate::new();
        let indexer = Arc::new(KvIndexer::new());
        substrate.install_strategy(indexer.clone());
        (substrate, indexer)
    }

    fn put(substrate: &Substrate, key: &[u8], data: &[u8]) -> u64 {
        let tx = substrate.begin_write();
        KvStore::new(&tx).put(key, data.to_vec(), 0).unwrap();
        substrate.commit(tx).unwrap().seqno
    }

    fn remove(substrate: &Substrate, key: &[u8]) -> u64 {
        let tx = substrate.begin_write();
        KvStore::new(&tx).remove(key).unwrap();
        substrate.commit(tx).unwrap().seqno
    }

    #[test]
    fn historical_get_sees_value_as_of_revision() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v1");
        let r2 = put(&substrate, b"k", b"v2");

        assert_eq!(indexer.get(r1, b"k").unwrap().unwrap().data, b"v1");
        assert_eq!(indexer.get(r2, b"k").unwrap().unwrap().data, b"v2");
        assert_eq!(indexer.cursor(), r2);
    }

    #[test]
    fn historical_get_sees_deletions() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v1");
        let r2 = remove(&substrate, b"k");
        let r3 = put(&substrate, b"k", b"v3");

        assert!(indexer.get(r1, b"k").unwrap().is_some());
        assert!(indexer.get(r2, b"k").unwrap().is_none());
        let recreated = indexer.get(r3, b"k").unwrap().unwrap();
        assert_eq!(recreated.data, b"v3");
        assert_eq!(recreated.version, 1);
        assert_eq!(recreated.create_revision, r3);
    }

    #[test]
    fn historical_range_is_bounded_and_ordered() {
        let (substrate, indexer) = indexed_substrate();
        put(&substrate, b"a", b"1");
        put(&substrate, b"b", b"2");
        let r3 = put(&substrate, b"c", b"3");
        remove(&substrate, b"b");

        let at_r3 = indexer.range(r3, b"a", None).unwrap();
        assert_eq!(
            at_r3.iter().map(|(k, _)| k.as_slice()).collect::<Vec<_>>(),
            vec![b"a".as_slice(), b"b", b"c"]
        );

        let after_delete = indexer.range(indexer.cursor(), b"a", None).unwrap();
        assert_eq!(
            after_delete
                .iter()
                .map(|(k, _)| k.as_slice())
                .collect::<Vec<_>>(),
            vec![b"a".as_slice(), b"c"]
        );
    }

    #[test]
    fn unindexed_revision_is_refused() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v");
        let err = indexer.get(r1 + 10, b"k").unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
    }

    #[test]
    fn compacted_revision_is_refused() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v1");
        let r2 = put(&substrate, b"k", b"v2");

        indexer.compact(r2).unwrap();
        let err = indexer.get(r1, b"k").unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
        // The floor itself stays readable.
        assert!(indexer.get(r2, b"k").unwrap().is_some());
    }

    #[test]
    fn compact_is_idempotent_and_monotone() {
        let (substrate, indexer) = indexed_substrate();
        put(&substrate, b"k", b"v1");
        let r2 = put(&substrate, b"k", b"v2");

        indexer.compact(r2).unwrap();
        indexer.compact(r2).unwrap();
        assert_eq!(indexer.compacted_revision(), r2);

        assert!(indexer.compact(r2 - 1).is_err());
        assert!(indexer.compact(r2 + 1).is_err());
    }

    #[test]
    fn duplicate_delivery_is_dropped() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v1");

        let read = substrate.begin_read();
        let replay = indexer.on_committed(
            TxId {
                term: 1,
                seqno: r1,
            },
            read.snapshot(),
        );
        assert!(replay.is_ok());
        assert_eq!(indexer.cursor(), r1);
        assert_eq!(indexer.get(r1, b"k").unwrap().unwrap().data, b"v1");
    }

    #[test]
    fn gap_in_delivery_is_an_error() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"k", b"v1");

        let read = substrate.begin_read();
        let err = indexer
            .on_committed(
                TxId {
                    term: 1,
                    seqno: r1 + 2,
                },
                read.snapshot(),
            )
            .unwrap_err();
        assert!(
            matches!(err, KvError::SequenceGap { expected, observed } if expected == r1 + 1 && observed == r1 + 2)
        );
    }

    #[test]
    fn keys_modified_at_reports_writes_and_deletes() {
        let (substrate, indexer) = indexed_substrate();
        let r1 = put(&substrate, b"a", b"1");
        let r2 = remove(&substrate, b"a");

        assert_eq!(indexer.keys_modified_at(r1).unwrap(), vec![b"a".to_vec()]);
        assert_eq!(indexer.keys_modified_at(r2).unwrap(), vec![b"a".to_vec()]);
    }

    #[test]
    fn untouched_keys_are_not_relogged() {
        let (substrate, indexer) = indexed_substrate();
        put(&substrate, b"stable", b"s");
        put(&substrate, b"hot", b"1");
        put(&substrate, b"hot", b"2");

        let state = indexer.state.lock().unwrap();
        assert_eq!(state.key_logs[b"stable".as_slice()].len(), 1);
        assert_eq!(state.key_logs[b"hot".as_slice()].len(), 2);
    }
}
