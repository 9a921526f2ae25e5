//! Consul KV API Client
//!
//! A small Rust client for the Consul key/value HTTP API, used as the
//! durable record store behind the DHCP range lease core.
//!
//! # Example
//!
//! ```no_run
//! use consul_client::{ConsulClient, ConsulKvTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client (the ACL token is optional)
//! let client = ConsulClient::new("http://consul:8500".to_string(), None)?;
//!
//! // Write a key
//! client.put_key("dhcp/leases/aa:bb:cc:dd:ee:ff", br#"{"ip":"10.0.0.2"}"#).await?;
//!
//! // Read every key below a prefix
//! for pair in client.list_prefix("dhcp/leases/").await? {
//!     println!("{} = {:?}", pair.key, pair.decoded_value()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **KV Operations**: recursive prefix listing, single-key reads, upserts
//! - **ACL Tokens**: optional `X-Consul-Token`, or `CONSUL_HTTP_TOKEN` via [`ConsulClient::from_env`]
//! - **Mocking**: [`ConsulKvTrait`] plus an in-memory mock behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod consul_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ConsulClient;
pub use error::ConsulError;
pub use models::KvPair;
pub use consul_trait::ConsulKvTrait;
#[cfg(feature = "test-util")]
pub use mock::MockConsulClient;
