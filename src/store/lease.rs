//! Lease store.
//!
//! Leases live in their own substrate map keyed by the 8-byte
//! big-endian lease id. A lease is just a TTL and the wall-clock second
//! it was granted (or last refreshed) at. Expiry is evaluated lazily:
//! reads filter out expired leases, and expired records are swept only
//! when Compact runs. Nothing here runs on a timer.

use crate::core::error::{KvError, KvResult};
use crate::substrate::{MapRead, MapWrite};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Substrate map holding the leases.
pub const LEASES_MAP: &str = "leases";

/// A granted lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Granted time-to-live in seconds.
    pub ttl: i64,

    /// Unix second the lease was granted or last refreshed.
    pub start_time: i64,
}

impl Lease {
    /// Create a lease granted at `now` with the given TTL.
    pub fn new(ttl: i64, now: i64) -> Self {
        Self {
            ttl,
            start_time: now,
        }
    }

    /// Seconds until expiry as of `now`. Negative once expired.
    pub fn ttl_remaining(&self, now: i64) -> i64 {
        self.start_time + self.ttl - now
    }

    /// Whether the lease has expired as of `now`.
    pub fn has_expired(&self, now: i64) -> bool {
        self.ttl_remaining(now) <= 0
    }

    fn to_bytes(&self) -> KvResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| KvError::Internal {
            message: format!("failed to serialize lease: {}", err),
        })
    }

    fn from_bytes(bytes: &[u8]) -> KvResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| KvError::Internal {
            message: format!("failed to deserialize lease: {}", err),
        })
    }
}

fn lease_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn lease_id_from_key(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

/// Pick a random positive 63-bit lease id.
///
/// Collisions with an existing lease are not checked; at 2^-63 per
/// grant the window is narrower than the substrate's own failure modes.
fn random_lease_id() -> i64 {
    loop {
        let id = (rand::thread_rng().gen::<u64>() >> 1) as i64;
        if id != 0 {
            return id;
        }
    }
}

/// Lease store over a substrate map handle.
pub struct LeaseStore<'a, T: ?Sized> {
    handle: &'a T,
}

impl<'a, T: MapRead + ?Sized> LeaseStore<'a, T> {
    /// Wrap a substrate handle.
    pub fn new(handle: &'a T) -> Self {
        Self { handle }
    }

    /// Fetch a lease if it exists and has not expired as of `now`.
    pub fn get(&self, id: i64, now: i64) -> KvResult<Option<Lease>> {
        match self.handle.get(LEASES_MAP, &lease_key(id)) {
            Some(bytes) => {
                let lease = Lease::from_bytes(&bytes)?;
                Ok(if lease.has_expired(now) {
                    None
                } else {
                    Some(lease)
                })
            }
            None => Ok(None),
        }
    }

    /// Whether a live lease with this id exists as of `now`.
    pub fn contains_live(&self, id: i64, now: i64) -> KvResult<bool> {
        Ok(self.get(id, now)?.is_some())
    }

    /// Visit every stored lease, expired ones included.
    ///
    /// Callers that only want live leases filter with
    /// [`Lease::has_expired`]; the Compact sweep wants the expired ones.
    pub fn foreach(&self, visit: &mut dyn FnMut(i64, Lease) -> bool) -> KvResult<()> {
        let mut failure = None;
        self.handle.range(LEASES_MAP, b"", None, &mut |key, bytes| {
            let Some(id) = lease_id_from_key(key) else {
                failure = Some(KvError::Internal {
                    message: format!("malformed lease key of {} bytes", key.len()),
                });
                return false;
            };
            match Lease::from_bytes(bytes) {
                Ok(lease) => visit(id, lease),
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
}

impl<'a, T: MapWrite + ?Sized> LeaseStore<'a, T> {
    /// Grant a lease with the given TTL, starting at `now`.
    ///
    /// A non-zero `requested_id` is honored as-is (overwriting any
    /// existing lease under that id); otherwise a random positive
    /// 63-bit id is chosen.
    pub fn grant(&self, requested_id: i64, ttl: i64, now: i64) -> KvResult<(i64, Lease)> {
        let id = if requested_id != 0 {
            requested_id
        } else {
            random_lease_id()
        };
        let lease = Lease::new(ttl, now);
        self.handle.put(LEASES_MAP, &lease_key(id), &lease.to_bytes()?);
        debug!(lease_id = id, ttl, "granted lease");
        Ok((id, lease))
    }

    /// Remove a lease. Removing an absent lease is a no-op.
    pub fn revoke(&self, id: i64) -> KvResult<()> {
        self.handle.remove(LEASES_MAP, &lease_key(id));
        debug!(lease_id = id, "revoked lease");
        Ok(())
    }

    /// Refresh a lease's start time to `now`, restoring its full TTL.
    ///
    /// Fails with [`KvError::LeaseNotFound`] if the lease is absent or
    /// already expired.
    pub fn keep_alive(&self, id: i64, now: i64) -> KvResult<Lease> {
        let Some(mut lease) = self.get(id, now)? else {
            return Err(KvError::LeaseNotFound { lease_id: id });
        };
        lease.start_time = now;
        self.handle.put(LEASES_MAP, &lease_key(id), &lease.to_bytes()?);
        debug!(lease_id = id, ttl = lease.ttl, "refreshed lease");
        Ok(lease)
    }
}
