//! etcd v3 operation handlers.
//!
//! Each write RPC runs inside one substrate write transaction: the
//! handler body buffers its mutations, and only a fully successful
//! body reaches commit. Any error drops the transaction, so Txn
//! branches and DeleteRange sweeps are atomic for free. Reads run
//! against a snapshot.
//!
//! The handler bodies are generic over the substrate handle traits,
//! which is what lets a Txn branch reuse the Range/Put/DeleteRange
//! logic against its own transaction.

use super::kv::{
    CompactionRequest, CompactionResponse, DeleteRangeRequest, DeleteRangeResponse, KeyValue,
    PutRequest, PutResponse, RangeRequest, RangeResponse, ResponseHeader, SortOrder,
};
use super::lease::{
    LeaseGrantRequest, LeaseGrantResponse, LeaseKeepAliveRequest, LeaseKeepAliveResponse,
    LeaseLeasesRequest, LeaseLeasesResponse, LeaseRevokeRequest, LeaseRevokeResponse, LeaseStatus,
    LeaseTimeToLiveRequest, LeaseTimeToLiveResponse,
};
use super::txn::{RequestOp, ResponseOp, TxnRequest, TxnResponse};
use crate::core::config::Config;
use crate::core::error::{KvError, KvResult};
use crate::core::time::{Clock, SystemClock};
use crate::store::index::KvIndexer;
use crate::store::kvstore::{KvStore, Value};
use crate::store::lease::LeaseStore;
use crate::substrate::{MapRead, MapWrite, Substrate, TxId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Interpret an etcd `range_end`: a single NUL byte means "all keys
/// greater than or equal to the start key".
fn range_upper_bound(range_end: &[u8]) -> Option<&[u8]> {
    if range_end == [0] {
        None
    } else {
        Some(range_end)
    }
}

/// The etcd v3 service over one substrate.
pub struct EtcdService {
    substrate: Arc<Substrate>,
    indexer: Arc<KvIndexer>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl EtcdService {
    /// Create a service over a fresh substrate, using the system clock.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a service with an explicit clock (tests use a manual one).
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let substrate = Arc::new(Substrate::new());
        let indexer = Arc::new(KvIndexer::new());
        substrate.install_strategy(indexer.clone());
        Self {
            substrate,
            indexer,
            clock,
            config,
        }
    }

    /// The historical index backing this service.
    pub fn indexer(&self) -> &KvIndexer {
        &self.indexer
    }

    fn header_for(&self, tx_id: TxId) -> ResponseHeader {
        let committed = self.substrate.committed_tx_id();
        ResponseHeader {
            cluster_id: self.config.node.cluster_id,
            member_id: self.config.node.member_id,
            revision: tx_id.seqno as i64,
            raft_term: tx_id.term,
            committed_revision: committed.seqno as i64,
            committed_raft_term: committed.term,
        }
    }

    // ========================================================================
    // KV operations
    // ========================================================================

    /// Range: read one key or a key interval, live or historical.
    pub fn range(&self, req: &RangeRequest) -> KvResult<RangeResponse> {
        let now = self.clock.now_seconds();
        let read = self.substrate.begin_read();
        let mut response = self.range_on(&read, req, now)?;
        response.header = self.header_for(read.snapshot().tx_id());
        Ok(response)
    }

    /// Put: write one key, optionally bound to a lease.
    pub fn put(&self, req: &PutRequest) -> KvResult<PutResponse> {
        let now = self.clock.now_seconds();
        let tx = self.substrate.begin_write();
        let mut response = self.put_on(&tx, req, now)?;
        let tx_id = self.substrate.commit(tx)?;
        response.header = self.header_for(tx_id);
        Ok(response)
    }

    /// DeleteRange: delete one key or a key interval.
    pub fn delete_range(&self, req: &DeleteRangeRequest) -> KvResult<DeleteRangeResponse> {
        let tx = self.substrate.begin_write();
        let mut response = self.delete_range_on(&tx, req)?;
        let tx_id = self.substrate.commit(tx)?;
        response.header = self.header_for(tx_id);
        Ok(response)
    }

    /// Txn: evaluate compares, run one branch, all in one transaction.
    pub fn txn(&self, req: &TxnRequest) -> KvResult<TxnResponse> {
        let now = self.clock.now_seconds();
        let tx = self.substrate.begin_write();
        let mut response = self.txn_on(&tx, req, now)?;
        let tx_id = self.substrate.commit(tx)?;
        response.header = self.header_for(tx_id);
        Ok(response)
    }

    /// Compact: sweep expired leases and raise the index's floor.
    pub fn compact(&self, req: &CompactionRequest) -> KvResult<CompactionResponse> {
        debug!(
            revision = req.revision,
            physical = req.physical,
            "compact"
        );
        if req.physical {
            return Err(KvError::unsupported("physical"));
        }
        if req.revision < 0 {
            return Err(KvError::invalid_argument(format!(
                "cannot compact at negative revision {}",
                req.revision
            )));
        }
        let now = self.clock.now_seconds();
        let tx = self.substrate.begin_write();
        self.revoke_expired_leases(&tx, now)?;
        let tx_id = self.substrate.commit(tx)?;
        self.indexer.compact(req.revision as u64)?;
        Ok(CompactionResponse {
            header: self.header_for(tx_id),
        })
    }

    // ========================================================================
    // Lease operations
    // ========================================================================

    /// LeaseGrant: create a lease, picking id and TTL where asked to.
    pub fn lease_grant(&self, req: &LeaseGrantRequest) -> KvResult<LeaseGrantResponse> {
        debug!(id = req.id, ttl = req.ttl, "lease grant");
        let now = self.clock.now_seconds();
        let mut ttl = if req.ttl <= 0 {
            self.config.lease.default_ttl_seconds
        } else {
            req.ttl
        };
        if ttl > self.config.lease.max_ttl_seconds {
            debug!(
                requested = ttl,
                max = self.config.lease.max_ttl_seconds,
                "capping requested lease ttl"
            );
            ttl = self.config.lease.max_ttl_seconds;
        }
        let tx = self.substrate.begin_write();
        let (id, lease) = LeaseStore::new(&tx).grant(req.id, ttl, now)?;
        let tx_id = self.substrate.commit(tx)?;
        Ok(LeaseGrantResponse {
            header: self.header_for(tx_id),
            id,
            ttl: lease.ttl,
        })
    }

    /// LeaseRevoke: drop the lease and delete every key bound to it.
    pub fn lease_revoke(&self, req: &LeaseRevokeRequest) -> KvResult<LeaseRevokeResponse> {
        debug!(id = req.id, "lease revoke");
        let tx = self.substrate.begin_write();
        LeaseStore::new(&tx).revoke(req.id)?;

        let store = KvStore::new(&tx);
        let mut doomed = Vec::new();
        store.foreach(&mut |key, value| {
            if value.lease == req.id {
                doomed.push(key.to_vec());
            }
            true
        })?;
        for key in &doomed {
            debug!(key = ?String::from_utf8_lossy(key), lease = req.id, "removing key of revoked lease");
            store.remove(key)?;
        }

        let tx_id = self.substrate.commit(tx)?;
        Ok(LeaseRevokeResponse {
            header: self.header_for(tx_id),
        })
    }

    /// LeaseTimeToLive: report remaining and granted TTL.
    pub fn lease_time_to_live(
        &self,
        req: &LeaseTimeToLiveRequest,
    ) -> KvResult<LeaseTimeToLiveResponse> {
        if req.keys {
            return Err(KvError::unsupported("keys"));
        }
        let now = self.clock.now_seconds();
        let read = self.substrate.begin_read();
        let (ttl, granted_ttl) = match LeaseStore::new(&read).get(req.id, now)? {
            Some(lease) => (lease.ttl_remaining(now), lease.ttl),
            // -1 is the wire convention for "no such lease".
            None => (-1, 0),
        };
        Ok(LeaseTimeToLiveResponse {
            header: self.header_for(read.snapshot().tx_id()),
            id: req.id,
            ttl,
            granted_ttl,
            keys: Vec::new(),
        })
    }

    /// LeaseLeases: list the ids of all live leases.
    pub fn lease_leases(&self, _req: &LeaseLeasesRequest) -> KvResult<LeaseLeasesResponse> {
        let now = self.clock.now_seconds();
        let read = self.substrate.begin_read();
        let mut leases = Vec::new();
        LeaseStore::new(&read).foreach(&mut |id, lease| {
            if !lease.has_expired(now) {
                leases.push(LeaseStatus { id });
            }
            true
        })?;
        Ok(LeaseLeasesResponse {
            header: self.header_for(read.snapshot().tx_id()),
            leases,
        })
    }

    /// LeaseKeepAlive: refresh a live lease to its full TTL.
    pub fn lease_keep_alive(&self, req: &LeaseKeepAliveRequest) -> KvResult<LeaseKeepAliveResponse> {
        debug!(id = req.id, "lease keep alive");
        let now = self.clock.now_seconds();
        let tx = self.substrate.begin_write();
        let lease = LeaseStore::new(&tx).keep_alive(req.id, now)?;
        let tx_id = self.substrate.commit(tx)?;
        Ok(LeaseKeepAliveResponse {
            header: self.header_for(tx_id),
            id: req.id,
            ttl: lease.ttl,
        })
    }

    // ========================================================================
    // Handler bodies, generic over the substrate handle
    // ========================================================================

    fn range_on<T: MapRead + ?Sized>(
        &self,
        handle: &T,
        req: &RangeRequest,
        now: i64,
    ) -> KvResult<RangeResponse> {
        if req.limit != 0 {
            return Err(KvError::unsupported(format!("limit {}", req.limit)));
        }
        if req.sort_order != SortOrder::None {
            return Err(KvError::unsupported(format!(
                "sort order {:?}",
                req.sort_order
            )));
        }
        if req.keys_only {
            return Err(KvError::unsupported("keys only"));
        }
        if req.count_only {
            return Err(KvError::unsupported("count only"));
        }
        if req.min_mod_revision != 0 {
            return Err(KvError::unsupported(format!(
                "min mod revision {}",
                req.min_mod_revision
            )));
        }
        if req.max_mod_revision != 0 {
            return Err(KvError::unsupported(format!(
                "max mod revision {}",
                req.max_mod_revision
            )));
        }
        if req.min_create_revision != 0 {
            return Err(KvError::unsupported(format!(
                "min create revision {}",
                req.min_create_revision
            )));
        }
        if req.max_create_revision != 0 {
            return Err(KvError::unsupported(format!(
                "max create revision {}",
                req.max_create_revision
            )));
        }

        let store = KvStore::new(handle);
        let lstore = LeaseStore::new(handle);
        let mut kvs = Vec::new();
        // Lease liveness is always checked against the live lease
        // store, historical reads included: a read-only endpoint cannot
        // sweep, but it must not serve keys whose lease is gone.
        let mut push = |key: Vec<u8>, value: Value| -> KvResult<()> {
            if value.lease != 0 && !lstore.contains_live(value.lease, now)? {
                debug!(
                    lease = value.lease,
                    "filtering out record whose lease is missing or expired"
                );
                return Ok(());
            }
            kvs.push(KeyValue::from_record(key, value));
            Ok(())
        };

        if req.range_end.is_empty() {
            let value = if req.revision > 0 {
                self.indexer.get(req.revision as u64, &req.key)?
            } else {
                store.get(&req.key)?
            };
            if let Some(value) = value {
                push(req.key.clone(), value)?;
            }
        } else {
            let to = range_upper_bound(&req.range_end);
            let records = if req.revision > 0 {
                self.indexer.range(req.revision as u64, &req.key, to)?
            } else {
                store.range(&req.key, to)?
            };
            for (key, value) in records {
                push(key, value)?;
            }
        }

        let count = kvs.len() as i64;
        Ok(RangeResponse {
            header: ResponseHeader::default(),
            kvs,
            more: false,
            count,
        })
    }

    fn put_on<T: MapWrite + ?Sized>(
        &self,
        tx: &T,
        req: &PutRequest,
        now: i64,
    ) -> KvResult<PutResponse> {
        if req.ignore_value {
            return Err(KvError::unsupported("ignore value"));
        }
        if req.ignore_lease {
            return Err(KvError::unsupported("ignore lease"));
        }
        if req.lease != 0 && !LeaseStore::new(tx).contains_live(req.lease, now)? {
            return Err(KvError::precondition(format!(
                "invalid lease {}: hasn't been granted or has expired",
                req.lease
            )));
        }

        let prev = KvStore::new(tx).put(&req.key, req.value.clone(), req.lease)?;
        let prev_kv = if req.prev_kv {
            prev.map(|value| KeyValue::from_record(req.key.clone(), value))
        } else {
            None
        };
        Ok(PutResponse {
            header: ResponseHeader::default(),
            prev_kv,
        })
    }

    fn delete_range_on<T: MapWrite + ?Sized>(
        &self,
        tx: &T,
        req: &DeleteRangeRequest,
    ) -> KvResult<DeleteRangeResponse> {
        let store = KvStore::new(tx);
        let mut deleted = 0;
        let mut prev_kvs = Vec::new();

        if req.range_end.is_empty() {
            if let Some(old) = store.remove(&req.key)? {
                deleted = 1;
                if req.prev_kv {
                    prev_kvs.push(KeyValue::from_record(req.key.clone(), old));
                }
            }
        } else {
            let to = range_upper_bound(&req.range_end);
            for (key, old) in store.range(&req.key, to)? {
                store.remove(&key)?;
                deleted += 1;
                if req.prev_kv {
                    prev_kvs.push(KeyValue::from_record(key, old));
                }
            }
        }

        Ok(DeleteRangeResponse {
            header: ResponseHeader::default(),
            deleted,
            prev_kvs,
        })
    }

    fn txn_on<T: MapWrite + ?Sized>(
        &self,
        tx: &T,
        req: &TxnRequest,
        now: i64,
    ) -> KvResult<TxnResponse> {
        debug!(
            compares = req.compare.len(),
            success = req.success.len(),
            failure = req.failure.len(),
            "txn"
        );
        let store = KvStore::new(tx);
        let mut succeeded = true;
        for cmp in &req.compare {
            if !cmp.range_end.is_empty() {
                return Err(KvError::unsupported("range_end in comparison"));
            }
            let record = store.get(&cmp.key)?;
            let outcome = cmp.evaluate(record.as_ref())?;
            succeeded = succeeded && outcome;
        }

        let branch = if succeeded { &req.success } else { &req.failure };
        let mut responses = Vec::with_capacity(branch.len());
        for op in branch {
            responses.push(match op {
                RequestOp::Range(r) => ResponseOp::Range(self.range_on(tx, r, now)?),
                RequestOp::Put(r) => ResponseOp::Put(self.put_on(tx, r, now)?),
                RequestOp::DeleteRange(r) => {
                    ResponseOp::DeleteRange(self.delete_range_on(tx, r)?)
                }
                RequestOp::Txn(r) => ResponseOp::Txn(self.txn_on(tx, r, now)?),
            });
        }

        Ok(TxnResponse {
            header: ResponseHeader::default(),
            succeeded,
            responses,
        })
    }

    /// Remove every expired lease record and every key bound to one.
    ///
    /// Runs inside the Compact transaction; this is the only place
    /// expired state is physically reclaimed.
    fn revoke_expired_leases<T: MapWrite + ?Sized>(&self, tx: &T, now: i64) -> KvResult<()> {
        let lstore = LeaseStore::new(tx);
        let mut expired = HashSet::new();
        lstore.foreach(&mut |id, lease| {
            if lease.has_expired(now) {
                expired.insert(id);
            }
            true
        })?;
        for id in &expired {
            debug!(lease = *id, "sweeping expired lease");
            lstore.revoke(*id)?;
        }

        if expired.is_empty() {
            return Ok(());
        }
        let store = KvStore::new(tx);
        let mut doomed = Vec::new();
        store.foreach(&mut |key, value| {
            if value.lease != 0 && expired.contains(&value.lease) {
                doomed.push(key.to_vec());
            }
            true
        })?;
        for key in &doomed {
            debug!(key = ?String::from_utf8_lossy(key), "removing key of expired lease");
            store.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::ManualClock;

    fn service() -> EtcdService {
        EtcdService::with_clock(Config::default(), Arc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn range_rejects_unimplemented_options() {
        let svc = service();
        let reject = |req: RangeRequest| {
            let err = svc.range(&req).unwrap_err();
            assert!(matches!(err, KvError::UnsupportedFeature { .. }), "{err}");
        };
        reject(RangeRequest {
            key: b"k".to_vec(),
            limit: 5,
            ..Default::default()
        });
        reject(RangeRequest {
            key: b"k".to_vec(),
            sort_order: SortOrder::Ascend,
            ..Default::default()
        });
        reject(RangeRequest {
            key: b"k".to_vec(),
            keys_only: true,
            ..Default::default()
        });
        reject(RangeRequest {
            key: b"k".to_vec(),
            count_only: true,
            ..Default::default()
        });
        reject(RangeRequest {
            key: b"k".to_vec(),
            min_mod_revision: 1,
            ..Default::default()
        });
        reject(RangeRequest {
            key: b"k".to_vec(),
            max_create_revision: 1,
            ..Default::default()
        });
    }

    #[test]
    fn put_rejects_ignore_flags() {
        let svc = service();
        let err = svc
            .put(&PutRequest {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                ignore_value: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, KvError::UnsupportedFeature { .. }));

        let err = svc
            .put(&PutRequest {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                ignore_lease: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, KvError::UnsupportedFeature { .. }));
    }

    #[test]
    fn failed_put_leaves_no_trace() {
        let svc = service();
        let err = svc
            .put(&PutRequest {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                lease: 12345,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, KvError::PreconditionFailed { .. }));

        let resp = svc
            .range(&RangeRequest {
                key: b"k".to_vec(),
                ..Default::default()
            })
            .unwrap();
        assert!(resp.kvs.is_empty());
        // The aborted transaction consumed no revision either.
        assert_eq!(resp.header.revision, 0);
    }

    #[test]
    fn compact_rejects_physical() {
        let svc = service();
        let err = svc
            .compact(&CompactionRequest {
                revision: 0,
                physical: true,
            })
            .unwrap_err();
        assert!(matches!(err, KvError::UnsupportedFeature { .. }));
    }

    #[test]
    fn time_to_live_rejects_keys() {
        let svc = service();
        let err = svc
            .lease_time_to_live(&LeaseTimeToLiveRequest { id: 1, keys: true })
            .unwrap_err();
        assert!(matches!(err, KvError::UnsupportedFeature { .. }));
    }
}
