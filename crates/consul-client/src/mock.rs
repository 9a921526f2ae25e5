//! Mock ConsulClient for unit testing
//!
//! This module provides a mock implementation of ConsulKvTrait that can be used
//! in unit tests without requiring a running Consul agent.

use crate::consul_trait::ConsulKvTrait;
use crate::error::ConsulError;
use crate::models::KvPair;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock ConsulClient for testing
///
/// Stores keys in memory and can be told to fail reads or writes, so tests
/// can exercise store outages.
#[derive(Debug, Clone)]
pub struct MockConsulClient {
    base_url: String,
    // key -> (modify index, raw value)
    entries: Arc<Mutex<BTreeMap<String, (u64, Vec<u8>)>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    next_index: Arc<AtomicU64>,
}

impl MockConsulClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicUsize::new(0)),
            next_index: Arc::new(AtomicU64::new(1)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, (u64, Vec<u8>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a key directly (for test setup); does not count as a write
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.entries().insert(key.into(), (index, value.into()));
    }

    /// Raw value currently stored under `key`
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.entries().get(key).map(|(_, value)| value.clone())
    }

    /// Make every subsequent `put_key` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read (`list_prefix`, `check_leader`) fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `put_key` calls, including failed ones
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), ConsulError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ConsulError::Api("mock: reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConsulKvTrait for MockConsulClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_leader(&self) -> Result<String, ConsulError> {
        self.check_reads()?;
        Ok("127.0.0.1:8300".to_string())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvPair>, ConsulError> {
        self.check_reads()?;
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (index, value))| KvPair::from_raw(key.clone(), value, *index))
            .collect())
    }

    async fn put_key(&self, key: &str, value: &[u8]) -> Result<(), ConsulError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ConsulError::Api(format!("mock: write to {} rejected", key)));
        }
        self.insert_raw(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_prefix_only_returns_matching_keys() {
        let mock = MockConsulClient::new("http://mock-consul");
        mock.insert_raw("dhcp/a/one", "1");
        mock.insert_raw("dhcp/a/two", "2");
        mock.insert_raw("dhcp/ab/three", "3");
        mock.insert_raw("other", "4");

        let pairs = mock.list_prefix("dhcp/a/").await.unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["dhcp/a/one", "dhcp/a/two"]);
        assert_eq!(pairs[1].decoded_value().unwrap(), b"2".to_vec());
    }

    #[tokio::test]
    async fn test_failed_writes_are_counted_but_not_stored() {
        let mock = MockConsulClient::new("http://mock-consul");
        mock.set_fail_writes(true);
        assert!(mock.put_key("k", b"v").await.is_err());
        assert_eq!(mock.write_count(), 1);
        assert!(mock.value("k").is_none());

        mock.set_fail_writes(false);
        mock.put_key("k", b"v").await.unwrap();
        assert_eq!(mock.write_count(), 2);
        assert_eq!(mock.value("k"), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_failed_reads() {
        let mock = MockConsulClient::new("http://mock-consul");
        mock.set_fail_reads(true);
        assert!(mock.list_prefix("").await.is_err());
        assert!(mock.check_leader().await.is_err());
    }
}
