//! Consul KV API models
//!
//! These models match the JSON returned by `GET /v1/kv/:key`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::ConsulError;

/// A single key/value entry as returned by the KV endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvPair {
    /// Full key path, without a leading slash
    pub key: String,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
    #[serde(default)]
    pub lock_index: u64,
    #[serde(default)]
    pub flags: u64,
    /// Base64-encoded value; `null` for keys stored without a body
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl KvPair {
    /// Build a pair from raw bytes, encoding the value the way Consul does
    pub fn from_raw(key: impl Into<String>, value: &[u8], modify_index: u64) -> Self {
        Self {
            key: key.into(),
            create_index: modify_index,
            modify_index,
            value: Some(STANDARD.encode(value)),
            ..Default::default()
        }
    }

    /// Decode the base64 `Value` field. A missing value decodes as empty.
    pub fn decoded_value(&self) -> Result<Vec<u8>, ConsulError> {
        match &self.value {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD.decode(encoded).map_err(|e| ConsulError::Decode {
                key: self.key.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_pair_deserializes_consul_payload() {
        let body = r#"[{
            "LockIndex": 0,
            "Key": "dhcp/leases/aa:bb",
            "Flags": 0,
            "Value": "eyJpcCI6IjEwLjAuMC4yIn0=",
            "CreateIndex": 100,
            "ModifyIndex": 200
        }]"#;
        let pairs: Vec<KvPair> = serde_json::from_str(body).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, "dhcp/leases/aa:bb");
        assert_eq!(pairs[0].modify_index, 200);
        assert_eq!(pairs[0].decoded_value().unwrap(), br#"{"ip":"10.0.0.2"}"#.to_vec());
    }

    #[test]
    fn test_null_value_decodes_as_empty() {
        let pair: KvPair = serde_json::from_str(r#"{"Key": "folder/", "Value": null}"#).unwrap();
        assert!(pair.decoded_value().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_base64_is_reported_with_key() {
        let pair = KvPair {
            key: "dhcp/leases/x".to_string(),
            value: Some("%%%".to_string()),
            ..Default::default()
        };
        match pair.decoded_value() {
            Err(ConsulError::Decode { key, .. }) => assert_eq!(key, "dhcp/leases/x"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
