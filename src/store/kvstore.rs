//! Versioned record store.
//!
//! Records live in one substrate map keyed by the user key. Each record
//! stores its value, lease binding, version counter, and create
//! revision; the mod revision is never persisted. Both revision fields
//! are hydrated at read time from the substrate's previous-write seqno:
//!
//! - `mod_revision` = seqno of the last committed write of the key
//!   (0 while the write is still uncommitted in the current tx)
//! - `create_revision` = persisted value, except that a persisted 0
//!   means "created by my own last write" and hydrates to the same
//!   seqno as `mod_revision`
//!
//! This keeps revisions consistent with the substrate's commit order
//! without the store ever knowing its commit seqno at write time.

use crate::core::error::{KvError, KvResult};
use crate::substrate::{MapRead, MapWrite};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Substrate map holding the records.
pub const RECORDS_MAP: &str = "records";

/// A stored record, pre- or post-hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// User payload.
    pub data: Vec<u8>,

    /// Revision the current incarnation of the key was created at.
    ///
    /// Persisted as 0 for a record whose creating write has not been
    /// read back through a committed snapshot yet.
    pub create_revision: u64,

    /// Revision of the last modification. Hydrated, never persisted.
    #[serde(skip)]
    pub mod_revision: u64,

    /// Number of writes since the key was (re)created.
    pub version: u64,

    /// Attached lease id, 0 for none.
    pub lease: i64,
}

impl Value {
    /// A fresh record for a first write of a key.
    pub fn new(data: Vec<u8>, lease: i64) -> Self {
        Self {
            data,
            create_revision: 0,
            mod_revision: 0,
            version: 1,
            lease,
        }
    }

    fn to_bytes(&self) -> KvResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| KvError::Internal {
            message: format!("failed to serialize record: {}", err),
        })
    }

    fn from_bytes(bytes: &[u8]) -> KvResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| KvError::Internal {
            message: format!("failed to deserialize record: {}", err),
        })
    }
}

/// Record store over a substrate map handle.
///
/// Read operations are available on any handle; put and remove only on
/// write transactions. The same store type therefore serves live
/// transactions and committed snapshots (the historical index rescans
/// snapshots through it).
pub struct KvStore<'a, T: ?Sized> {
    handle: &'a T,
}

impl<'a, T: MapRead + ?Sized> KvStore<'a, T> {
    /// Wrap a substrate handle.
    pub fn new(handle: &'a T) -> Self {
        Self { handle }
    }

    /// Fetch and hydrate the record stored under `key`.
    pub fn get(&self, key: &[u8]) -> KvResult<Option<Value>> {
        match self.handle.get(RECORDS_MAP, key) {
            Some(bytes) => {
                let value = Value::from_bytes(&bytes)?;
                Ok(Some(self.hydrate(key, value)))
            }
            None => Ok(None),
        }
    }

    /// Collect hydrated records with keys in `[from, to)` in key order.
    ///
    /// `to = None` means unbounded above.
    pub fn range(&self, from: &[u8], to: Option<&[u8]>) -> KvResult<Vec<(Vec<u8>, Value)>> {
        let mut out = Vec::new();
        let mut failure = None;
        self.handle.range(RECORDS_MAP, from, to, &mut |key, bytes| {
            match Value::from_bytes(bytes) {
                Ok(value) => {
                    out.push((key.to_vec(), self.hydrate(key, value)));
                    true
                }
                Err(err) => {
                    failure = Some(err);
                    false
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    /// Visit every hydrated record in key order.
    ///
    /// The visitor returns `false` to stop early.
    pub fn foreach(&self, visit: &mut dyn FnMut(&[u8], Value) -> bool) -> KvResult<()> {
        let mut failure = None;
        self.handle.range(RECORDS_MAP, b"", None, &mut |key, bytes| {
            match Value::from_bytes(bytes) {
                Ok(value) => visit(key, self.hydrate(key, value)),
                Err(err) => {
                    failure = Some(err);
                    false
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn hydrate(&self, key: &[u8], mut value: Value) -> Value {
        let revision = self
            .handle
            .version_of_previous_write(RECORDS_MAP, key)
            .unwrap_or(0);
        if value.create_revision == 0 {
            value.create_revision = revision;
        }
        value.mod_revision = revision;
        value
    }
}

impl<'a, T: MapWrite + ?Sized> KvStore<'a, T> {
    /// Write `data` under `key`, preserving the key's creation metadata.
    ///
    /// A write over an existing record carries its (hydrated) create
    /// revision forward and bumps the version; a write to an absent key
    /// starts a new incarnation at version 1. Returns the previous
    /// record for `prev_kv` reporting.
    pub fn put(&self, key: &[u8], data: Vec<u8>, lease: i64) -> KvResult<Option<Value>> {
        let prev = self.get(key)?;
        let mut value = Value::new(data, lease);
        if let Some(old) = &prev {
            value.create_revision = old.create_revision;
            value.version = old.version + 1;
        }
        self.handle.put(RECORDS_MAP, key, &value.to_bytes()?);
        debug!(key = ?String::from_utf8_lossy(key), version = value.version, "put record");
        Ok(prev)
    }

    /// Remove the record under `key`, returning what was there.
    ///
    /// The record is physically deleted, so a later put starts a new
    /// incarnation (fresh create revision, version 1).
    pub fn remove(&self, key: &[u8]) -> KvResult<Option<Value>> {
        let prev = self.get(key)?;
        if prev.is_some() {
            self.handle.remove(RECORDS_MAP, key);
            debug!(key = ?String::from_utf8_lossy(key), "removed record");
        }
        Ok(prev)
    }
}
