//! In-memory transactional map substrate.
//!
//! The substrate stores named maps of byte keys to byte values. Each
//! committed write stamps the touched entries with the commit sequence
//! number, which upper layers read back through
//! [`MapRead::version_of_previous_write`] to hydrate revisions.
//!
//! ```text
//!   begin_write ──► WriteTx (snapshot + private write set)
//!                      │ put/remove buffered, reads see the overlay
//!   commit ─────────► seqno assigned, entries stamped, snapshot swapped,
//!                      committed tx delivered to strategies in order
//! ```
//!
//! Commits are serialized under one lock, so sequence numbers are dense
//! (1, 2, 3, ...) and strategies observe every transaction exactly once
//! and in order. Strategy failures are logged, never propagated: the
//! commit itself has already happened.

use crate::core::error::KvResult;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, warn};

/// Identifier of a committed (or in-flight) transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxId {
    /// Leadership term of the substrate at commit time.
    pub term: u64,
    /// Commit sequence number, dense and starting at 1.
    pub seqno: u64,
}

/// A stored entry plus the seqno of the transaction that last wrote it.
#[derive(Debug, Clone)]
struct Slot {
    data: Vec<u8>,
    write_seqno: u64,
}

type MapData = BTreeMap<Vec<u8>, Slot>;

/// Read-only view of map access, shared by snapshots and transactions.
pub trait MapRead {
    /// Fetch the value stored under `key` in `map`.
    fn get(&self, map: &str, key: &[u8]) -> Option<Vec<u8>>;

    /// Visit entries of `map` with keys in `[from, to)` in key order.
    ///
    /// `to = None` means unbounded above. The visitor returns `false`
    /// to stop early.
    fn range(
        &self,
        map: &str,
        from: &[u8],
        to: Option<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    );

    /// Seqno of the last committed transaction that wrote `key`, if the
    /// key exists in committed state.
    ///
    /// Writes buffered in the current transaction are deliberately not
    /// visible here: an uncommitted entry has no commit seqno yet.
    fn version_of_previous_write(&self, map: &str, key: &[u8]) -> Option<u64>;
}

/// Mutable map access, available only inside a write transaction.
pub trait MapWrite: MapRead {
    /// Buffer a put of `key = value` in `map`.
    fn put(&self, map: &str, key: &[u8], value: &[u8]);

    /// Buffer a removal of `key` from `map`.
    fn remove(&self, map: &str, key: &[u8]);
}

fn key_bounds<'a>(from: &'a [u8], to: Option<&'a [u8]>) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    let upper = match to {
        Some(t) => Bound::Excluded(t),
        None => Bound::Unbounded,
    };
    (Bound::Included(from), upper)
}

fn range_is_empty(from: &[u8], to: Option<&[u8]>) -> bool {
    matches!(to, Some(t) if t <= from)
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of committed state as of one commit sequence number.
#[derive(Debug, Default)]
pub struct Snapshot {
    seqno: u64,
    term: u64,
    maps: HashMap<String, MapData>,
}

impl Snapshot {
    /// Seqno of the commit this snapshot reflects (0 = nothing committed).
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Term under which this snapshot was committed.
    pub fn term(&self) -> u64 {
        self.term
    }

    /// Identifier of the commit this snapshot reflects.
    pub fn tx_id(&self) -> TxId {
        TxId {
            term: self.term,
            seqno: self.seqno,
        }
    }
}

impl MapRead for Snapshot {
    fn get(&self, map: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.maps.get(map)?.get(key).map(|slot| slot.data.clone())
    }

    fn range(
        &self,
        map: &str,
        from: &[u8],
        to: Option<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        if range_is_empty(from, to) {
            return;
        }
        let Some(data) = self.maps.get(map) else {
            return;
        };
        for (key, slot) in data.range::<[u8], _>(key_bounds(from, to)) {
            if !visit(key, &slot.data) {
                break;
            }
        }
    }

    fn version_of_previous_write(&self, map: &str, key: &[u8]) -> Option<u64> {
        self.maps.get(map)?.get(key).map(|slot| slot.write_seqno)
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Snapshot-isolated read-only transaction.
pub struct ReadTx {
    snapshot: Arc<Snapshot>,
}

impl ReadTx {
    /// The snapshot this transaction reads from.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl MapRead for ReadTx {
    fn get(&self, map: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.snapshot.get(map, key)
    }

    fn range(
        &self,
        map: &str,
        from: &[u8],
        to: Option<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        self.snapshot.range(map, from, to, visit)
    }

    fn version_of_previous_write(&self, map: &str, key: &[u8]) -> Option<u64> {
        self.snapshot.version_of_previous_write(map, key)
    }
}

/// `Some(bytes)` is a buffered put, `None` a buffered removal.
type WriteSet = HashMap<String, BTreeMap<Vec<u8>, Option<Vec<u8>>>>;

/// Write transaction: a snapshot plus a private, uncommitted write set.
///
/// Reads go through the write set first (read-your-own-writes), then
/// fall back to the snapshot. The write set stays invisible to every
/// other transaction until [`Substrate::commit`] applies it.
pub struct WriteTx {
    snapshot: Arc<Snapshot>,
    writes: Mutex<WriteSet>,
}

impl WriteTx {
    /// The committed snapshot this transaction started from.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl MapRead for WriteTx {
    fn get(&self, map: &str, key: &[u8]) -> Option<Vec<u8>> {
        let writes = self.writes.lock().unwrap();
        if let Some(buffered) = writes.get(map).and_then(|m| m.get(key)) {
            return buffered.clone();
        }
        self.snapshot.get(map, key)
    }

    fn range(
        &self,
        map: &str,
        from: &[u8],
        to: Option<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        if range_is_empty(from, to) {
            return;
        }
        // Merge the committed snapshot with the buffered overlay so the
        // visitor sees one ordered sequence.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        self.snapshot.range(map, from, to, &mut |key, value| {
            merged.insert(key.to_vec(), value.to_vec());
            true
        });
        let writes = self.writes.lock().unwrap();
        if let Some(overlay) = writes.get(map) {
            for (key, buffered) in overlay.range::<[u8], _>(key_bounds(from, to)) {
                match buffered {
                    Some(value) => {
                        merged.insert(key.clone(), value.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }
        drop(writes);
        for (key, value) in &merged {
            if !visit(key, value) {
                break;
            }
        }
    }

    fn version_of_previous_write(&self, map: &str, key: &[u8]) -> Option<u64> {
        // Committed state only: buffered writes have no seqno yet.
        self.snapshot.version_of_previous_write(map, key)
    }
}

impl MapWrite for WriteTx {
    fn put(&self, map: &str, key: &[u8], value: &[u8]) {
        self.writes
            .lock()
            .unwrap()
            .entry(map.to_string())
            .or_default()
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    fn remove(&self, map: &str, key: &[u8]) {
        self.writes
            .lock()
            .unwrap()
            .entry(map.to_string())
            .or_default()
            .insert(key.to_vec(), None);
    }
}

// ============================================================================
// Commit strategies
// ============================================================================

/// Observer of committed transactions, registered with the substrate.
///
/// The substrate delivers each committed transaction to every strategy
/// whose `next_requested` seqno has been reached, in commit order,
/// exactly once, while still holding the commit lock.
pub trait CommitStrategy: Send + Sync {
    /// Name used in delivery logs.
    fn name(&self) -> &'static str;

    /// The next commit seqno this strategy wants to see.
    fn next_requested(&self) -> u64;

    /// Handle one committed transaction and the state it produced.
    fn on_committed(&self, tx_id: TxId, snapshot: &Snapshot) -> KvResult<()>;
}

// ============================================================================
// Substrate
// ============================================================================

struct SubstrateInner {
    snapshot: Arc<Snapshot>,
    term: u64,
    strategies: Vec<Arc<dyn CommitStrategy>>,
}

/// In-memory transactional substrate.
///
/// One lock serializes commits and strategy delivery; reads only take
/// it long enough to clone the current snapshot Arc.
pub struct Substrate {
    inner: RwLock<SubstrateInner>,
}

impl Default for Substrate {
    fn default() -> Self {
        Self::new()
    }
}

impl Substrate {
    /// Create an empty substrate at seqno 0, term 1.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SubstrateInner {
                snapshot: Arc::new(Snapshot {
                    seqno: 0,
                    term: 1,
                    maps: HashMap::new(),
                }),
                term: 1,
                strategies: Vec::new(),
            }),
        }
    }

    /// Register a commit strategy.
    ///
    /// Strategies are expected to be installed before the first commit;
    /// the substrate retains no history to replay for late joiners.
    pub fn install_strategy(&self, strategy: Arc<dyn CommitStrategy>) {
        let mut inner = self.inner.write().unwrap();
        let committed = inner.snapshot.seqno;
        if strategy.next_requested() <= committed {
            warn!(
                strategy = strategy.name(),
                next_requested = strategy.next_requested(),
                committed,
                "strategy installed behind the committed seqno; earlier transactions will not be replayed"
            );
        }
        inner.strategies.push(strategy);
    }

    /// Begin a snapshot-isolated read-only transaction.
    pub fn begin_read(&self) -> ReadTx {
        ReadTx {
            snapshot: Arc::clone(&self.inner.read().unwrap().snapshot),
        }
    }

    /// Begin a write transaction against the current committed state.
    pub fn begin_write(&self) -> WriteTx {
        WriteTx {
            snapshot: Arc::clone(&self.inner.read().unwrap().snapshot),
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Identifier of the latest committed transaction.
    pub fn committed_tx_id(&self) -> TxId {
        self.inner.read().unwrap().snapshot.tx_id()
    }

    /// Commit a write transaction.
    ///
    /// Assigns the next seqno, stamps every written entry with it,
    /// publishes the new snapshot, and delivers the committed
    /// transaction to registered strategies in order. A transaction
    /// with an empty write set still consumes a seqno, which keeps the
    /// sequence dense for strategies.
    pub fn commit(&self, tx: WriteTx) -> KvResult<TxId> {
        let writes = tx.writes.into_inner().unwrap();
        let mut inner = self.inner.write().unwrap();
        let seqno = inner.snapshot.seqno + 1;
        let term = inner.term;

        let mut maps = inner.snapshot.maps.clone();
        for (map, entries) in writes {
            let data = maps.entry(map).or_default();
            for (key, buffered) in entries {
                match buffered {
                    Some(value) => {
                        data.insert(
                            key,
                            Slot {
                                data: value,
                                write_seqno: seqno,
                            },
                        );
                    }
                    None => {
                        data.remove(&key);
                    }
                }
            }
        }

        let snapshot = Arc::new(Snapshot { seqno, term, maps });
        inner.snapshot = Arc::clone(&snapshot);
        let tx_id = TxId { term, seqno };
        debug!(seqno, "committed transaction");

        for strategy in &inner.strategies {
            if strategy.next_requested() > seqno {
                continue;
            }
            if let Err(err) = strategy.on_committed(tx_id, &snapshot) {
                error!(
                    strategy = strategy.name(),
                    seqno,
                    error = %err,
                    "commit strategy failed to process transaction"
                );
            }
        }

        Ok(tx_id)
    }
}
