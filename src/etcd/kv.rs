//! etcd KV request and response payloads.
//!
//! Field-for-field mirrors of the etcd v3 wire messages, as plain serde
//! structs. Options the handlers do not implement are still present
//! here so requests deserialize cleanly and can be rejected with a
//! precise error instead of being silently ignored.

use crate::store::kvstore::Value;
use serde::{Deserialize, Serialize};

/// Response header included in all etcd responses.
///
/// `revision`/`raft_term` describe the transaction the response was
/// produced in; `committed_revision`/`committed_raft_term` describe
/// what the substrate had committed when the response was built. The
/// pair lets clients distinguish locally applied state from durable
/// state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Cluster ID.
    pub cluster_id: u64,
    /// Member ID.
    pub member_id: u64,
    /// Revision at which the operation was performed.
    pub revision: i64,
    /// Term at which the operation was performed.
    pub raft_term: u64,
    /// Latest committed revision.
    pub committed_revision: i64,
    /// Term of the latest committed revision.
    pub committed_raft_term: u64,
}

/// Key-value pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Key.
    pub key: Vec<u8>,
    /// Revision when created.
    pub create_revision: i64,
    /// Revision of last modification.
    pub mod_revision: i64,
    /// Number of writes since creation.
    pub version: i64,
    /// Value.
    pub value: Vec<u8>,
    /// Attached lease ID.
    pub lease: i64,
}

impl KeyValue {
    /// Build the wire pair from a hydrated record.
    pub fn from_record(key: Vec<u8>, value: Value) -> Self {
        Self {
            key,
            create_revision: value.create_revision as i64,
            mod_revision: value.mod_revision as i64,
            version: value.version as i64,
            value: value.data,
            lease: value.lease,
        }
    }
}

/// Sort order for range results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    None,
    Ascend,
    Descend,
}

/// Sort target for range results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortTarget {
    #[default]
    Key,
    Version,
    Create,
    Mod,
    Value,
}

/// Range request (Get).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRequest {
    /// Key to get or start of range.
    pub key: Vec<u8>,
    /// End of range (exclusive). Empty for single key; a single NUL
    /// byte means "all keys >= key".
    pub range_end: Vec<u8>,
    /// Maximum number of keys to return.
    pub limit: i64,
    /// Revision to read at (0 for latest).
    pub revision: i64,
    /// Sort order.
    pub sort_order: SortOrder,
    /// Sort target.
    pub sort_target: SortTarget,
    /// Serializable read.
    pub serializable: bool,
    /// Only return keys, not values.
    pub keys_only: bool,
    /// Only return count of keys.
    pub count_only: bool,
    /// Minimum mod_revision filter.
    pub min_mod_revision: i64,
    /// Maximum mod_revision filter.
    pub max_mod_revision: i64,
    /// Minimum create_revision filter.
    pub min_create_revision: i64,
    /// Maximum create_revision filter.
    pub max_create_revision: i64,
}

impl Default for RangeRequest {
    fn default() -> Self {
        Self {
            key: Vec::new(),
            range_end: Vec::new(),
            limit: 0,
            revision: 0,
            sort_order: SortOrder::None,
            sort_target: SortTarget::Key,
            serializable: false,
            keys_only: false,
            count_only: false,
            min_mod_revision: 0,
            max_mod_revision: 0,
            min_create_revision: 0,
            max_create_revision: 0,
        }
    }
}

/// Range response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Key-value pairs.
    pub kvs: Vec<KeyValue>,
    /// More results available (pagination, never set here).
    pub more: bool,
    /// Count of keys returned.
    pub count: i64,
}

/// Put request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutRequest {
    /// Key to put.
    pub key: Vec<u8>,
    /// Value to put.
    pub value: Vec<u8>,
    /// Lease ID to attach, 0 for none.
    pub lease: i64,
    /// Return previous key-value.
    pub prev_kv: bool,
    /// Ignore value (update lease only).
    pub ignore_value: bool,
    /// Ignore lease (update value only).
    pub ignore_lease: bool,
}

/// Put response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Previous key-value (if requested).
    pub prev_kv: Option<KeyValue>,
}

/// Delete request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRangeRequest {
    /// Key to delete or start of range.
    pub key: Vec<u8>,
    /// End of range (exclusive). Same conventions as Range.
    pub range_end: Vec<u8>,
    /// Return previous key-values.
    pub prev_kv: bool,
}

/// Delete response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRangeResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Number of keys deleted.
    pub deleted: i64,
    /// Previous key-values (if requested).
    pub prev_kvs: Vec<KeyValue>,
}

/// Compaction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionRequest {
    /// Revision to compact up to.
    pub revision: i64,
    /// Physical compaction (reclaim space before responding).
    pub physical: bool,
}

/// Compaction response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionResponse {
    /// Response header.
    pub header: ResponseHeader,
}
