//! Lease state manager.
//!
//! Owns the lease table and the address allocator and keeps both consistent
//! with the durable store. Every lease request runs under one async mutex,
//! from the table lookup through the store write, so no two clients can ever
//! be handed the same address.
//!
//! Startup is two-phase: every persisted record is loaded, then each record's
//! exact address is reserved in a fresh allocator. Any reservation failure
//! aborts startup, since serving with a diverged allocator could lease an
//! address that already belongs to someone else.

use crate::allocator::AddressAllocator;
use crate::config::MAX_LEASE_DURATION;
use crate::error::LeaseError;
use crate::metrics::LeaseMetrics;
use crate::record::{LeaseRecord, round_duration, round_to_second};
use crate::store::LeaseStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Address and lifetime handed to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseGrant {
    /// Address assigned to the client
    pub address: Ipv4Addr,
    /// Lease time to advertise, always the configured duration
    pub lifetime: Duration,
}

#[derive(Debug)]
struct LeaseTable {
    records: HashMap<String, LeaseRecord>,
    allocator: Box<dyn AddressAllocator>,
}

/// Serializes every lease decision across the table, allocator and store.
#[derive(Debug)]
pub struct LeaseStateManager {
    table: Mutex<LeaseTable>,
    store: LeaseStore,
    lease_duration: TimeDelta,
    lifetime: Duration,
    metrics: LeaseMetrics,
}

impl LeaseStateManager {
    /// Load persisted leases and reserve their addresses in `allocator`.
    ///
    /// `allocator` must be fresh: any address it already holds that a
    /// persisted record also claims is reported as a consistency error.
    ///
    /// # Errors
    ///
    /// * [`LeaseError::InvalidConfig`] - lease duration shorter than a second or
    ///   longer than [`MAX_LEASE_DURATION`]
    /// * [`LeaseError::Store`] / [`LeaseError::CorruptRecord`] - bulk load failed
    /// * [`LeaseError::StartupConsistency`] - a persisted address could not be reserved
    pub async fn recover(
        store: LeaseStore,
        mut allocator: Box<dyn AddressAllocator>,
        lease_duration: Duration,
        metrics: LeaseMetrics,
    ) -> Result<Self, LeaseError> {
        let lifetime = round_duration(lease_duration);
        if lifetime.is_zero() {
            return Err(LeaseError::InvalidConfig(
                "lease duration must be at least one second".to_string(),
            ));
        }
        if lifetime > MAX_LEASE_DURATION {
            return Err(LeaseError::InvalidConfig(format!(
                "lease duration {:?} exceeds the maximum of {} seconds",
                lease_duration,
                MAX_LEASE_DURATION.as_secs()
            )));
        }
        let delta = TimeDelta::from_std(lease_duration).map_err(|_| {
            LeaseError::InvalidConfig(format!("lease duration {:?} is too large", lease_duration))
        })?;

        // Phase 1: load
        let records = store.load_all().await?;

        // Phase 2: reserve each exact address
        let mut ordered: Vec<_> = records.iter().collect();
        ordered.sort_by_key(|(_, record)| record.address);
        for (hw_addr, record) in ordered {
            match allocator.allocate_exact(record.address) {
                Ok(reserved) if reserved == record.address => {}
                Ok(reserved) => {
                    return Err(LeaseError::StartupConsistency {
                        hw_addr: hw_addr.clone(),
                        address: record.address,
                        reason: format!("allocator reserved {} instead", reserved),
                    });
                }
                Err(e) => {
                    return Err(LeaseError::StartupConsistency {
                        hw_addr: hw_addr.clone(),
                        address: record.address,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Loaded {} DHCPv4 leases from {} (prefix {})",
            records.len(),
            store.location(),
            store.prefix()
        );

        metrics.active.set(gauge_value(records.len() as u64));
        metrics.capacity.set(gauge_value(allocator.capacity()));

        Ok(Self {
            table: Mutex::new(LeaseTable { records, allocator }),
            store,
            lease_duration: delta,
            lifetime,
            metrics,
        })
    }

    /// Lease time advertised to every client
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Metrics handle shared with the manager
    pub fn metrics(&self) -> &LeaseMetrics {
        &self.metrics
    }

    /// Assign or renew the address for `hw_addr`.
    ///
    /// A known client keeps its address. Its record is only rewritten when the
    /// stored expiry falls before `now + lease duration`. A new client gets
    /// the next free address. A failed store write is logged and counted but
    /// does not fail the request, since the in-memory state already reflects
    /// the grant.
    ///
    /// # Errors
    ///
    /// * [`LeaseError::InvalidHardwareAddress`] - empty `hw_addr`
    /// * [`LeaseError::Allocation`] - no free address; nothing was changed
    /// * [`LeaseError::ExpiryOutOfRange`] - `now` is too close to the end of time
    pub async fn lease(
        &self,
        hw_addr: &str,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaseGrant, LeaseError> {
        if hw_addr.is_empty() {
            return Err(LeaseError::InvalidHardwareAddress(hw_addr.to_string()));
        }

        let offered_until = now.checked_add_signed(self.lease_duration).ok_or_else(|| {
            LeaseError::ExpiryOutOfRange {
                hw_addr: hw_addr.to_string(),
                now,
            }
        })?;
        let mut table = self.table.lock().await;

        let address = match table.records.get_mut(hw_addr) {
            Some(record) => {
                if record.expiry < offered_until {
                    let previous = record.expiry;
                    record.expiry = round_to_second(offered_until);
                    record.hostname = hostname.to_string();
                    let renewed = record.clone();
                    if renewed.expiry != previous {
                        self.metrics.renewed.inc();
                    }
                    debug!("Renewed lease of {} for MAC {} until {}", renewed.address, hw_addr, renewed.expiry);
                    self.persist(hw_addr, &renewed).await;
                    renewed.address
                } else {
                    debug!("Lease of {} for MAC {} already runs until {}", record.address, hw_addr, record.expiry);
                    record.address
                }
            }
            None => {
                info!("MAC address {} is new, leasing new IPv4 address", hw_addr);
                let address = match table.allocator.allocate_any() {
                    Ok(address) => address,
                    Err(e) => {
                        self.metrics.allocation_failures.inc();
                        error!("Could not allocate IP for MAC {}: {}", hw_addr, e);
                        return Err(LeaseError::Allocation(e));
                    }
                };

                let record = LeaseRecord::new(address, offered_until, hostname);
                self.persist(hw_addr, &record).await;
                table.records.insert(hw_addr.to_string(), record);
                self.metrics.granted.inc();
                self.metrics.active.set(gauge_value(table.records.len() as u64));
                address
            }
        };

        info!("found IP address {} for MAC {}", address, hw_addr);
        Ok(LeaseGrant {
            address,
            lifetime: self.lifetime,
        })
    }

    async fn persist(&self, hw_addr: &str, record: &LeaseRecord) {
        if let Err(e) = self.store.upsert(hw_addr, record).await {
            self.metrics.persist_failures.inc();
            warn!(
                "Could not persist lease {} for MAC {}, serving from memory only: {}",
                record.address, hw_addr, e
            );
        }
    }

    /// Current record for `hw_addr`
    pub async fn record(&self, hw_addr: &str) -> Option<LeaseRecord> {
        self.table.lock().await.records.get(hw_addr).cloned()
    }

    /// Number of records in the table
    pub async fn len(&self) -> usize {
        self.table.lock().await.records.len()
    }

    /// Whether no client has been served yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
