//! Record, lease, and historical stores.
//!
//! - [`kvstore`] - Versioned record store with read-time revision hydration
//! - [`lease`] - Lease store (grant, revoke, keepalive, lazy expiry)
//! - [`index`] - Historical index built from the substrate commit stream

pub mod index;
pub mod kvstore;
pub mod lease;
