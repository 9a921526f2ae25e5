//! Server error types.

use consul_range::LeaseError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that stop the DHCPv4 server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid environment configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Plugin setup or recovery failed
    #[error("Lease setup failed: {0}")]
    Lease(#[from] LeaseError),

    /// Socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Reply could not be encoded
    #[error("Failed to encode DHCPv4 reply: {0}")]
    Encode(String),

    /// Socket IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
