//! Lease core error types.

use crate::allocator::AllocatorError;
use chrono::{DateTime, Utc};
use consul_client::ConsulError;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur while setting up or serving leases.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Bad or missing setup argument
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request carried no usable client hardware address
    #[error("Invalid hardware address: {0:?}")]
    InvalidHardwareAddress(String),

    /// The allocator could not hand out an address
    #[error("Address allocation failed: {0}")]
    Allocation(#[from] AllocatorError),

    /// A persisted lease could not be re-reserved in the allocator at startup
    #[error("Lease for {hw_addr} on {address} cannot be restored: {reason}")]
    StartupConsistency {
        /// Client the persisted lease belongs to
        hw_addr: String,
        /// Address recorded in the store
        address: Ipv4Addr,
        /// What the allocator said
        reason: String,
    },

    /// `now + lease duration` is not a representable timestamp
    #[error("Lease expiry for {hw_addr} is out of range at {now}")]
    ExpiryOutOfRange {
        /// Client that asked for the lease
        hw_addr: String,
        /// Request time
        now: DateTime<Utc>,
    },

    /// A stored value is not a lease record
    #[error("Corrupt lease record under key {key}: {reason}")]
    CorruptRecord {
        /// Full store key
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Durable store error
    #[error("Lease store error: {0}")]
    Store(#[from] ConsulError),

    /// JSON encoding of a record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metric registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
