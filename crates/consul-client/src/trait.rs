//! ConsulClient trait for mocking
//!
//! This trait abstracts the ConsulClient to enable mocking in unit tests.
//! The concrete ConsulClient implements this trait, and tests can use the mock implementation.

use crate::error::ConsulError;
use crate::models::KvPair;

/// Trait for Consul KV operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ConsulKvTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Ask the agent for the current raft leader; doubles as a connectivity check
    async fn check_leader(&self) -> Result<String, ConsulError>;

    /// Every pair whose key starts with `prefix`. An absent prefix is an empty list.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvPair>, ConsulError>;

    /// Create or replace `key` with the raw `value`
    async fn put_key(&self, key: &str, value: &[u8]) -> Result<(), ConsulError>;
}
