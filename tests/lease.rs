//! Tests for lease grant, revoke, keepalive, and lazy expiry.

mod common;

use common::{assert_err, get_one, put, put_with_lease, test_service};
use sealkv::error::KvError;
use sealkv::etcd::kv::PutRequest;
use sealkv::etcd::lease::{
    LeaseGrantRequest, LeaseKeepAliveRequest, LeaseLeasesRequest, LeaseRevokeRequest,
    LeaseTimeToLiveRequest,
};

fn grant(service: &sealkv::etcd::EtcdService, id: i64, ttl: i64) -> i64 {
    service
        .lease_grant(&LeaseGrantRequest { ttl, id })
        .expect("grant failed")
        .id
}

// ============================================================================
// Grant
// ============================================================================

#[test]
fn grant_with_zero_ttl_uses_server_default() {
    let (service, _clock) = test_service();
    let response = service
        .lease_grant(&LeaseGrantRequest { ttl: 0, id: 0 })
        .unwrap();
    assert_eq!(response.ttl, 60);
    assert!(response.id > 0);
}

#[test]
fn grant_caps_excessive_ttl() {
    let (service, _clock) = test_service();
    let response = service
        .lease_grant(&LeaseGrantRequest { ttl: 86_400, id: 0 })
        .unwrap();
    assert_eq!(response.ttl, 600);
}

#[test]
fn grant_honors_client_chosen_id() {
    let (service, _clock) = test_service();
    let response = service
        .lease_grant(&LeaseGrantRequest { ttl: 30, id: 4242 })
        .unwrap();
    assert_eq!(response.id, 4242);
    assert_eq!(response.ttl, 30);
}

#[test]
fn granted_ids_are_distinct() {
    let (service, _clock) = test_service();
    let a = grant(&service, 0, 30);
    let b = grant(&service, 0, 30);
    assert_ne!(a, b);
}

// ============================================================================
// TimeToLive / Leases
// ============================================================================

#[test]
fn time_to_live_counts_down() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 30);

    clock.advance(12);
    let response = service
        .lease_time_to_live(&LeaseTimeToLiveRequest { id, keys: false })
        .unwrap();
    assert_eq!(response.id, id);
    assert_eq!(response.ttl, 18);
    assert_eq!(response.granted_ttl, 30);
}

#[test]
fn time_to_live_of_unknown_lease_is_minus_one() {
    let (service, _clock) = test_service();
    let response = service
        .lease_time_to_live(&LeaseTimeToLiveRequest {
            id: 777,
            keys: false,
        })
        .unwrap();
    assert_eq!(response.ttl, -1);
    assert_eq!(response.granted_ttl, 0);
}

#[test]
fn leases_lists_only_live_leases() {
    let (service, clock) = test_service();
    let short = grant(&service, 0, 10);
    let long = grant(&service, 0, 100);

    clock.advance(50);
    let response = service.lease_leases(&LeaseLeasesRequest {}).unwrap();
    let ids: Vec<i64> = response.leases.iter().map(|l| l.id).collect();
    assert!(ids.contains(&long));
    assert!(!ids.contains(&short));
}

// ============================================================================
// KeepAlive
// ============================================================================

#[test]
fn keep_alive_restores_full_ttl() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 30);

    clock.advance(25);
    let response = service
        .lease_keep_alive(&LeaseKeepAliveRequest { id })
        .unwrap();
    assert_eq!(response.ttl, 30);

    let ttl = service
        .lease_time_to_live(&LeaseTimeToLiveRequest { id, keys: false })
        .unwrap();
    assert_eq!(ttl.ttl, 30);
}

#[test]
fn keep_alive_of_expired_lease_fails() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 10);

    clock.advance(30);
    let err = assert_err(service.lease_keep_alive(&LeaseKeepAliveRequest { id }));
    assert!(matches!(err, KvError::LeaseNotFound { lease_id } if lease_id == id));
}

// ============================================================================
// Lease-bound keys
// ============================================================================

#[test]
fn put_with_unknown_lease_is_rejected() {
    let (service, _clock) = test_service();
    let err = assert_err(service.put(&PutRequest {
        key: b"k".to_vec(),
        value: b"v".to_vec(),
        lease: 31337,
        ..Default::default()
    }));
    assert!(matches!(err, KvError::PreconditionFailed { .. }));
}

#[test]
fn put_with_expired_lease_is_rejected() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 10);
    clock.advance(60);
    let err = assert_err(service.put(&PutRequest {
        key: b"k".to_vec(),
        value: b"v".to_vec(),
        lease: id,
        ..Default::default()
    }));
    assert!(matches!(err, KvError::PreconditionFailed { .. }));
}

#[test]
fn revoke_deletes_bound_keys_only() {
    let (service, _clock) = test_service();
    let id = grant(&service, 0, 60);
    put_with_lease(&service, b"bound", b"v", id);
    put(&service, b"free", b"v");

    service.lease_revoke(&LeaseRevokeRequest { id }).unwrap();

    assert!(get_one(&service, b"bound").is_none());
    assert!(get_one(&service, b"free").is_some());
    let ttl = service
        .lease_time_to_live(&LeaseTimeToLiveRequest { id, keys: false })
        .unwrap();
    assert_eq!(ttl.ttl, -1);
}

#[test]
fn revoke_of_unknown_lease_is_a_noop() {
    let (service, _clock) = test_service();
    put(&service, b"free", b"v");
    service
        .lease_revoke(&LeaseRevokeRequest { id: 12345 })
        .unwrap();
    assert!(get_one(&service, b"free").is_some());
}

#[test]
fn reads_filter_keys_of_expired_leases() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 10);
    put_with_lease(&service, b"bound", b"v", id);

    assert!(get_one(&service, b"bound").is_some());
    clock.advance(30);
    // The record still exists physically but reads hide it.
    assert!(get_one(&service, b"bound").is_none());
}

#[test]
fn keep_alive_keeps_bound_keys_visible() {
    let (service, clock) = test_service();
    let id = grant(&service, 0, 10);
    put_with_lease(&service, b"bound", b"v", id);

    clock.advance(8);
    service
        .lease_keep_alive(&LeaseKeepAliveRequest { id })
        .unwrap();
    clock.advance(8);
    // T0+16: the original grant would have lapsed at T0+10, but the
    // refresh at T0+8 pushed expiry to T0+18.
    assert!(get_one(&service, b"bound").is_some());

    let granted = service
        .lease_time_to_live(&LeaseTimeToLiveRequest { id, keys: false })
        .unwrap();
    assert_eq!(granted.granted_ttl, 10);
}
