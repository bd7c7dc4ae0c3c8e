//! Core infrastructure shared across the crate.
//!
//! - [`error`] - Error taxonomy and adapter status mapping
//! - [`config`] - Configuration parsing and validation
//! - [`time`] - Wall-clock abstraction

pub mod config;
pub mod error;
pub mod time;
