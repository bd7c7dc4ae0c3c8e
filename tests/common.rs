//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use sealkv::config::Config;
use sealkv::core::time::{Clock, ManualClock};
use sealkv::etcd::kv::{KeyValue, PutRequest, RangeRequest, RangeResponse};
use sealkv::etcd::EtcdService;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Fixed test epoch, seconds.
pub const T0: i64 = 1_700_000_000;

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[node]
cluster_id = 7
member_id = 3

[lease]
default_ttl_seconds = 60
max_ttl_seconds = 600
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Create a service on a fresh substrate with a manual clock at [`T0`].
pub fn test_service() -> (EtcdService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let service = EtcdService::with_clock(Config::default(), clock.clone());
    (service, clock)
}

/// Put a key without a lease, panicking on failure.
pub fn put(service: &EtcdService, key: &[u8], value: &[u8]) -> i64 {
    let response = service
        .put(&PutRequest {
            key: key.to_vec(),
            value: value.to_vec(),
            ..Default::default()
        })
        .expect("put failed");
    response.header.revision
}

/// Put a key bound to a lease, panicking on failure.
pub fn put_with_lease(service: &EtcdService, key: &[u8], value: &[u8], lease: i64) -> i64 {
    let response = service
        .put(&PutRequest {
            key: key.to_vec(),
            value: value.to_vec(),
            lease,
            ..Default::default()
        })
        .expect("put failed");
    response.header.revision
}

/// Read a single key at the latest revision.
pub fn get_one(service: &EtcdService, key: &[u8]) -> Option<KeyValue> {
    let mut response = service
        .range(&RangeRequest {
            key: key.to_vec(),
            ..Default::default()
        })
        .expect("range failed");
    response.kvs.pop()
}

/// Range over `[key, range_end)` at the given revision (0 = latest).
pub fn range_at(
    service: &EtcdService,
    key: &[u8],
    range_end: &[u8],
    revision: i64,
) -> RangeResponse {
    service
        .range(&RangeRequest {
            key: key.to_vec(),
            range_end: range_end.to_vec(),
            revision,
            ..Default::default()
        })
        .expect("range failed")
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err and return the error.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads() {
        let file = create_minimal_config();
        let config = load_config(&file);
        assert_eq!(config.node.cluster_id, 7);
        assert_eq!(config.node.member_id, 3);
        assert_eq!(config.lease.default_ttl_seconds, 60);
    }

    #[test]
    fn test_service_starts_empty() {
        let (service, clock) = test_service();
        assert_eq!(clock.now_seconds(), T0);
        assert!(get_one(&service, b"anything").is_none());
    }

    #[test]
    fn put_helper_reports_revisions() {
        let (service, _clock) = test_service();
        assert_eq!(put(&service, b"a", b"1"), 1);
        assert_eq!(put(&service, b"b", b"2"), 2);
    }
}
