//! Consul-backed range lease core for a DHCPv4 server.
//!
//! Hands out addresses from a single IPv4 range, persists every lease as a
//! JSON record in Consul KV and replays those records into the allocator on
//! startup, so a restarted server never offers an address it already gave
//! to another client.
//!
//! # Example
//!
//! ```no_run
//! use consul_range::ConsulRange;
//! use prometheus::Registry;
//!
//! # async fn example() -> Result<(), consul_range::LeaseError> {
//! let registry = Registry::new();
//! let plugin = ConsulRange::setup(
//!     &["127.0.0.1:8500", "dhcp/leases", "10.0.0.2", "10.0.0.250", "1h"],
//!     &registry,
//! )
//! .await?;
//! let grant = plugin
//!     .manager()
//!     .lease("aa:bb:cc:dd:ee:ff", "node-1", chrono::Utc::now())
//!     .await?;
//! println!("{} for {:?}", grant.address, grant.lifetime);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod metrics;
pub mod plugin;
pub mod record;
pub mod state;
pub mod store;

pub use allocator::{AddressAllocator, AllocatorError, BitmapAllocator};
pub use config::PluginArgs;
pub use error::LeaseError;
pub use metrics::LeaseMetrics;
pub use plugin::ConsulRange;
pub use record::LeaseRecord;
pub use state::{LeaseGrant, LeaseStateManager};
pub use store::LeaseStore;
