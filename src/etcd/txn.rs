//! etcd transaction payloads and comparison evaluation.
//!
//! A Txn carries compare predicates plus success/failure operation
//! branches. All predicates are evaluated against the transaction's
//! own view of the store; an absent key compares as an all-zero
//! record, so `Version == 0` is the idiomatic "key does not exist"
//! guard.

use super::kv::{
    DeleteRangeRequest, DeleteRangeResponse, PutRequest, PutResponse, RangeRequest, RangeResponse,
    ResponseHeader,
};
use crate::core::error::{KvError, KvResult};
use crate::store::kvstore::Value;
use serde::{Deserialize, Serialize};

/// Transaction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxnRequest {
    /// Compare predicates (all must pass for the success branch).
    pub compare: Vec<Compare>,
    /// Operations to execute if all compares pass.
    pub success: Vec<RequestOp>,
    /// Operations to execute if any compare fails.
    pub failure: Vec<RequestOp>,
}

/// Compare predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compare {
    /// Comparison operator.
    pub result: CompareResult,
    /// Record attribute being compared.
    pub target: CompareTarget,
    /// Key to compare.
    pub key: Vec<u8>,
    /// Expected value; the variant must match `target`.
    pub target_union: CompareTargetUnion,
    /// Range end for multi-key compares (not supported).
    pub range_end: Vec<u8>,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareResult {
    Equal,
    Greater,
    Less,
    NotEqual,
}

/// Record attribute a compare targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareTarget {
    Version,
    Create,
    Mod,
    Value,
    Lease,
}

/// Expected value for a compare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompareTargetUnion {
    Version(i64),
    CreateRevision(i64),
    ModRevision(i64),
    Value(Vec<u8>),
    Lease(i64),
}

/// Request operation within a transaction branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestOp {
    Range(RangeRequest),
    Put(PutRequest),
    DeleteRange(DeleteRangeRequest),
    Txn(TxnRequest),
}

/// Response operation from a transaction branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseOp {
    Range(RangeResponse),
    Put(PutResponse),
    DeleteRange(DeleteRangeResponse),
    Txn(TxnResponse),
}

/// Transaction response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxnResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Whether all compares passed.
    pub succeeded: bool,
    /// Responses from the executed branch, in order.
    pub responses: Vec<ResponseOp>,
}

impl Compare {
    /// Evaluate this predicate against a hydrated record.
    ///
    /// `None` stands for an absent key and compares as an all-zero
    /// record with an empty value. A `target`/`target_union` mismatch
    /// is a malformed request, not a failed comparison.
    pub fn evaluate(&self, record: Option<&Value>) -> KvResult<bool> {
        let version = record.map_or(0, |v| v.version as i64);
        let create_revision = record.map_or(0, |v| v.create_revision as i64);
        let mod_revision = record.map_or(0, |v| v.mod_revision as i64);
        let lease = record.map_or(0, |v| v.lease);
        let data: &[u8] = record.map_or(&[], |v| &v.data);

        match (self.target, &self.target_union) {
            (CompareTarget::Version, CompareTargetUnion::Version(expected)) => {
                Ok(compare_values(version, *expected, self.result))
            }
            (CompareTarget::Create, CompareTargetUnion::CreateRevision(expected)) => {
                Ok(compare_values(create_revision, *expected, self.result))
            }
            (CompareTarget::Mod, CompareTargetUnion::ModRevision(expected)) => {
                Ok(compare_values(mod_revision, *expected, self.result))
            }
            (CompareTarget::Value, CompareTargetUnion::Value(expected)) => {
                Ok(compare_bytes(data, expected, self.result))
            }
            (CompareTarget::Lease, CompareTargetUnion::Lease(expected)) => {
                Ok(compare_values(lease, *expected, self.result))
            }
            (target, _) => Err(KvError::invalid_argument(format!(
                "unknown target in comparison: {:?}",
                target
            ))),
        }
    }
}

fn compare_values(actual: i64, expected: i64, result: CompareResult) -> bool {
    match result {
        CompareResult::Equal => actual == expected,
        CompareResult::NotEqual => actual != expected,
        CompareResult::Greater => actual > expected,
        CompareResult::Less => actual < expected,
    }
}

fn compare_bytes(actual: &[u8], expected: &[u8], result: CompareResult) -> bool {
    match result {
        CompareResult::Equal => actual == expected,
        CompareResult::NotEqual => actual != expected,
        CompareResult::Greater => actual > expected,
        CompareResult::Less => actual < expected,
    }
}
