//! Plugin argument parsing.
//!
//! The plugin takes five positional arguments:
//! Consul base URL, KV prefix, range start, range end, lease duration.

use crate::error::LeaseError;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::warn;

/// Longest lease that fits the 32-bit lease time option
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(u32::MAX as u64);

/// Validated setup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginArgs {
    /// Consul agent address, e.g. `http://127.0.0.1:8500`
    pub consul_url: String,
    /// KV prefix all lease keys live under
    pub kv_prefix: String,
    /// First address of the range
    pub range_start: Ipv4Addr,
    /// Last address of the range, numerically greater than the start
    pub range_end: Ipv4Addr,
    /// Lease duration, e.g. parsed from `1h30m`
    pub lease_duration: Duration,
}

impl PluginArgs {
    /// Parse and validate the positional arguments.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, LeaseError> {
        if args.len() < 5 {
            return Err(LeaseError::InvalidConfig(format!(
                "invalid number of arguments, want: 5 (Consul base URL, KV prefix, start IP, end IP, lease time), got: {}",
                args.len()
            )));
        }
        if args.len() > 5 {
            warn!("Ignoring {} extra plugin argument(s)", args.len() - 5);
        }

        let consul_url = args[0].as_ref().trim();
        if consul_url.is_empty() {
            return Err(LeaseError::InvalidConfig("Consul URL cannot be empty".to_string()));
        }

        let kv_prefix = args[1].as_ref().trim();
        if kv_prefix.trim_matches('/').is_empty() {
            return Err(LeaseError::InvalidConfig("Consul KV prefix cannot be empty".to_string()));
        }

        let range_start = parse_ipv4(args[2].as_ref())?;
        let range_end = parse_ipv4(args[3].as_ref())?;
        if u32::from(range_start) >= u32::from(range_end) {
            return Err(LeaseError::InvalidConfig(
                "start of IP range has to be lower than the end of an IP range".to_string(),
            ));
        }

        let raw_duration = args[4].as_ref();
        let lease_duration = humantime::parse_duration(raw_duration.trim()).map_err(|e| {
            LeaseError::InvalidConfig(format!("invalid lease duration: {} ({})", raw_duration, e))
        })?;
        if lease_duration < Duration::from_millis(500) {
            return Err(LeaseError::InvalidConfig(format!(
                "lease duration {} is shorter than one second",
                raw_duration
            )));
        }

        if lease_duration > MAX_LEASE_DURATION {
            return Err(LeaseError::InvalidConfig(format!(
                "lease duration {} exceeds the maximum of {} seconds",
                raw_duration,
                MAX_LEASE_DURATION.as_secs()
            )));
        }

        Ok(Self {
            consul_url: consul_url.to_string(),
            kv_prefix: kv_prefix.to_string(),
            range_start,
            range_end,
            lease_duration,
        })
    }
}

fn parse_ipv4(raw: &str) -> Result<Ipv4Addr, LeaseError> {
    raw.trim()
        .parse()
        .map_err(|_| LeaseError::InvalidConfig(format!("invalid IPv4 address: {}", raw)))
}
