//! Durable lease storage in the Consul KV namespace.
//!
//! Each client's record lives under its own key, `{prefix}/{hw_addr}`, so
//! several independent instances can share one Consul cluster.

use crate::error::LeaseError;
use crate::record::LeaseRecord;
use consul_client::ConsulKvTrait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bulk-load and upsert access to persisted lease records.
#[derive(Clone)]
pub struct LeaseStore {
    kv: Arc<dyn ConsulKvTrait>,
    prefix: String,
}

impl LeaseStore {
    /// Create a store rooted at `prefix` (leading and trailing `/` are ignored).
    pub fn new(kv: Arc<dyn ConsulKvTrait>, prefix: &str) -> Result<Self, LeaseError> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(LeaseError::InvalidConfig(
                "Consul KV prefix cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            kv,
            prefix: prefix.to_string(),
        })
    }

    /// Key prefix, without trailing slash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Base URL of the backing agent
    pub fn location(&self) -> &str {
        self.kv.base_url()
    }

    /// Full key for a client
    pub fn key_for(&self, hw_addr: &str) -> String {
        format!("{}/{}", self.prefix, hw_addr)
    }

    /// Load every record stored under the prefix, keyed by hardware address.
    ///
    /// A value that does not decode as a record is an error: dropping it would
    /// leave its address free for another client.
    pub async fn load_all(&self) -> Result<HashMap<String, LeaseRecord>, LeaseError> {
        let folder = format!("{}/", self.prefix);
        let pairs = self.kv.list_prefix(&folder).await?;

        let mut records = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let Some(hw_addr) = pair.key.strip_prefix(&folder) else {
                continue;
            };
            if hw_addr.is_empty() {
                // Folder placeholder created by the Consul UI
                continue;
            }
            if hw_addr.contains('/') {
                warn!("Ignoring nested key {} below lease prefix {}", pair.key, self.prefix);
                continue;
            }

            let bytes = pair.decoded_value().map_err(|e| LeaseError::CorruptRecord {
                key: pair.key.clone(),
                reason: e.to_string(),
            })?;
            let record = LeaseRecord::from_json(&bytes).map_err(|e| LeaseError::CorruptRecord {
                key: pair.key.clone(),
                reason: e.to_string(),
            })?;
            records.insert(hw_addr.to_string(), record);
        }

        debug!("Loaded {} records from {}", records.len(), folder);
        Ok(records)
    }

    /// Create or replace the record for `hw_addr`.
    pub async fn upsert(&self, hw_addr: &str, record: &LeaseRecord) -> Result<(), LeaseError> {
        let body = record.to_json()?;
        self.kv.put_key(&self.key_for(hw_addr), &body).await?;
        Ok(())
    }
}

impl std::fmt::Debug for LeaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseStore")
            .field("location", &self.kv.base_url())
            .field("prefix", &self.prefix)
            .finish()
    }
}
