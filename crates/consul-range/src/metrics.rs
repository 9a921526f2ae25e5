//! Prometheus metrics for lease activity.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `dhcp_leases_granted_total` | Counter | New leases handed out |
//! | `dhcp_leases_renewed_total` | Counter | Existing leases whose expiry moved |
//! | `dhcp_lease_persist_failures_total` | Counter | Store writes that failed |
//! | `dhcp_allocation_failures_total` | Counter | Requests refused for lack of an address |
//! | `dhcp_leases_active` | Gauge | Records in the lease table |
//! | `dhcp_pool_capacity` | Gauge | Addresses in the configured range |
//!
//! A rising `dhcp_lease_persist_failures_total` means leases are being served
//! from memory only and will be lost on restart.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Lease manager metrics. Cheap to clone; clones share the same series.
#[derive(Debug, Clone)]
pub struct LeaseMetrics {
    pub(crate) granted: IntCounter,
    pub(crate) renewed: IntCounter,
    pub(crate) persist_failures: IntCounter,
    pub(crate) allocation_failures: IntCounter,
    pub(crate) active: IntGauge,
    pub(crate) capacity: IntGauge,
}

impl LeaseMetrics {
    /// Create the metrics and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            granted: IntCounter::with_opts(Opts::new(
                "dhcp_leases_granted_total",
                "New leases handed out",
            ))?,
            renewed: IntCounter::with_opts(Opts::new(
                "dhcp_leases_renewed_total",
                "Existing leases whose expiry was extended",
            ))?,
            persist_failures: IntCounter::with_opts(Opts::new(
                "dhcp_lease_persist_failures_total",
                "Lease writes to the durable store that failed",
            ))?,
            allocation_failures: IntCounter::with_opts(Opts::new(
                "dhcp_allocation_failures_total",
                "Requests refused because no address could be allocated",
            ))?,
            active: IntGauge::with_opts(Opts::new(
                "dhcp_leases_active",
                "Records in the lease table",
            ))?,
            capacity: IntGauge::with_opts(Opts::new(
                "dhcp_pool_capacity",
                "Addresses in the configured range",
            ))?,
        };

        registry.register(Box::new(metrics.granted.clone()))?;
        registry.register(Box::new(metrics.renewed.clone()))?;
        registry.register(Box::new(metrics.persist_failures.clone()))?;
        registry.register(Box::new(metrics.allocation_failures.clone()))?;
        registry.register(Box::new(metrics.active.clone()))?;
        registry.register(Box::new(metrics.capacity.clone()))?;

        Ok(metrics)
    }

    /// Metrics that are not attached to any registry.
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        Self::new(&Registry::new())
    }

    /// Leases granted so far
    pub fn granted(&self) -> u64 {
        self.granted.get()
    }

    /// Renewals that moved a lease's expiry
    pub fn renewed(&self) -> u64 {
        self.renewed.get()
    }

    /// Failed store writes
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.get()
    }

    /// Requests refused for lack of an address
    pub fn allocation_failures(&self) -> u64 {
        self.allocation_failures.get()
    }
}

/// Render every metric in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
