//! Consul client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Consul HTTP API
#[derive(Debug, Error)]
pub enum ConsulError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Consul API returned an error or an unexpected answer
    #[error("Consul API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A KV value was not valid base64
    #[error("Invalid KV value for key {key}: {reason}")]
    Decode {
        /// Key whose value failed to decode
        key: String,
        /// Decoder message
        reason: String,
    },

    /// ACL token rejected
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The configured agent address cannot be used as a base URL
    #[error("Invalid Consul address: {0}")]
    InvalidAddress(String),
}
