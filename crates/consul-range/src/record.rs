//! Lease records and their persisted JSON form.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// One client's lease, as held in memory and in the store.
///
/// Serialized as `{"ip": "10.0.0.2", "expires": 1700000000, "hostname": "h"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Assigned address
    #[serde(rename = "ip")]
    pub address: Ipv4Addr,

    /// End of the lease, whole seconds
    #[serde(rename = "expires", with = "chrono::serde::ts_seconds")]
    pub expiry: DateTime<Utc>,

    /// Last hostname the client reported; advisory only
    #[serde(default)]
    pub hostname: String,
}

impl LeaseRecord {
    /// Create a record; `expiry` is truncated to whole seconds.
    pub fn new(address: Ipv4Addr, expiry: DateTime<Utc>, hostname: impl Into<String>) -> Self {
        Self {
            address,
            expiry: expiry.trunc_subsecs(0),
            hostname: hostname.into(),
        }
    }

    /// Encode for the store.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a stored value.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Round to the nearest whole second, halves away from zero.
pub fn round_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = time.trunc_subsecs(0);
    if time.timestamp_subsec_nanos() >= 500_000_000 {
        truncated + TimeDelta::seconds(1)
    } else {
        truncated
    }
}

/// Round a duration to the nearest whole second, halves up.
pub fn round_duration(duration: Duration) -> Duration {
    let carry = u64::from(duration.subsec_nanos() >= 500_000_000);
    Duration::from_secs(duration.as_secs().saturating_add(carry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_wire_format() {
        let record = LeaseRecord::new(
            Ipv4Addr::new(10, 0, 0, 2),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            "printer",
        );
        let json: serde_json::Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ip": "10.0.0.2", "expires": 1_700_000_000, "hostname": "printer"})
        );
    }

    #[test]
    fn test_record_without_hostname_decodes_as_empty() {
        let record = LeaseRecord::from_json(br#"{"ip":"192.168.1.7","expires":42}"#).unwrap();
        assert_eq!(record.address, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(record.expiry.timestamp(), 42);
        assert_eq!(record.hostname, "");
    }

    #[test]
    fn test_record_rejects_ipv6_and_garbage() {
        assert!(LeaseRecord::from_json(br#"{"ip":"::1","expires":42,"hostname":""}"#).is_err());
        assert!(LeaseRecord::from_json(br#"{"ip":"10.0.0.1","expires":"soon"}"#).is_err());
        assert!(LeaseRecord::from_json(b"not json").is_err());
    }

    #[test]
    fn test_new_truncates_subseconds() {
        let expiry = Utc.timestamp_opt(100, 900_000_000).unwrap();
        let record = LeaseRecord::new(Ipv4Addr::new(10, 0, 0, 2), expiry, "");
        assert_eq!(record.expiry, Utc.timestamp_opt(100, 0).unwrap());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(
            round_to_second(Utc.timestamp_opt(100, 499_999_999).unwrap()),
            Utc.timestamp_opt(100, 0).unwrap()
        );
        assert_eq!(
            round_to_second(Utc.timestamp_opt(100, 500_000_000).unwrap()),
            Utc.timestamp_opt(101, 0).unwrap()
        );
        assert_eq!(round_duration(Duration::from_millis(3_600_400)), Duration::from_secs(3600));
        assert_eq!(round_duration(Duration::from_millis(1_500)), Duration::from_secs(2));
    }
}
