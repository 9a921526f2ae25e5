//! Plugin setup: argument validation, client construction and recovery.

use crate::allocator::BitmapAllocator;
use crate::config::PluginArgs;
use crate::error::LeaseError;
use crate::metrics::LeaseMetrics;
use crate::state::LeaseStateManager;
use crate::store::LeaseStore;
use consul_client::{ConsulClient, ConsulKvTrait};
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;

/// A ready-to-serve range plugin instance.
#[derive(Debug)]
pub struct ConsulRange {
    manager: LeaseStateManager,
}

impl ConsulRange {
    /// Validate `args`, connect to Consul and replay persisted leases.
    ///
    /// The ACL token, if any, is read from `CONSUL_HTTP_TOKEN`.
    pub async fn setup<S: AsRef<str>>(args: &[S], registry: &Registry) -> Result<Self, LeaseError> {
        let args = PluginArgs::parse(args)?;
        let client = ConsulClient::from_env(args.consul_url.clone())?;
        Self::with_client(args, Arc::new(client), registry).await
    }

    /// Like [`ConsulRange::setup`], with an already constructed KV client.
    ///
    /// Fails fast with [`LeaseError::Store`] if the agent does not answer a
    /// leader query.
    pub async fn with_client(
        args: PluginArgs,
        kv: Arc<dyn ConsulKvTrait>,
        registry: &Registry,
    ) -> Result<Self, LeaseError> {
        let allocator = BitmapAllocator::new(args.range_start, args.range_end).map_err(|e| {
            LeaseError::InvalidConfig(format!("could not create an allocator: {}", e))
        })?;
        let leader = kv.check_leader().await?;
        info!("Connected to Consul at {} (leader {})", kv.base_url(), leader);

        let store = LeaseStore::new(kv, &args.kv_prefix)?;
        let metrics = LeaseMetrics::new(registry)?;

        let manager =
            LeaseStateManager::recover(store, Box::new(allocator), args.lease_duration, metrics)
                .await?;

        info!(
            "consulrange ready: {} - {}, lease time {:?}",
            args.range_start,
            args.range_end,
            manager.lifetime()
        );
        Ok(Self { manager })
    }

    /// The lease state manager behind this instance
    pub fn manager(&self) -> &LeaseStateManager {
        &self.manager
    }
}
