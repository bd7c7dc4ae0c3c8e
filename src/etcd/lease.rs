//! etcd lease RPC payloads.

use super::kv::ResponseHeader;
use serde::{Deserialize, Serialize};

/// Lease grant request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseGrantRequest {
    /// Requested TTL in seconds; non-positive asks the server to pick.
    pub ttl: i64,
    /// Requested lease ID; 0 asks the server to pick.
    pub id: i64,
}

/// Lease grant response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseGrantResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Granted lease ID.
    pub id: i64,
    /// Granted TTL in seconds (may differ from the requested TTL).
    pub ttl: i64,
}

/// Lease revoke request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseRevokeRequest {
    /// Lease to revoke.
    pub id: i64,
}

/// Lease revoke response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseRevokeResponse {
    /// Response header.
    pub header: ResponseHeader,
}

/// Lease keep-alive request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseKeepAliveRequest {
    /// Lease to refresh.
    pub id: i64,
}

/// Lease keep-alive response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseKeepAliveResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Refreshed lease ID.
    pub id: i64,
    /// TTL in effect after the refresh.
    pub ttl: i64,
}

/// Lease time-to-live request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseTimeToLiveRequest {
    /// Lease to query.
    pub id: i64,
    /// Also list the keys attached to the lease.
    pub keys: bool,
}

/// Lease time-to-live response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseTimeToLiveResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Queried lease ID.
    pub id: i64,
    /// Remaining TTL in seconds; -1 if the lease does not exist.
    pub ttl: i64,
    /// TTL originally granted.
    pub granted_ttl: i64,
    /// Keys attached to the lease (only with `keys = true`).
    pub keys: Vec<Vec<u8>>,
}

/// Lease listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseLeasesRequest {}

/// Status entry in a lease listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseStatus {
    /// Lease ID.
    pub id: i64,
}

/// Lease listing response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseLeasesResponse {
    /// Response header.
    pub header: ResponseHeader,
    /// Live leases.
    pub leases: Vec<LeaseStatus>,
}
