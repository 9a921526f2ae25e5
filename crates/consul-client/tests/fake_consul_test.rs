//! HTTP-level tests for ConsulClient against an in-process fake agent.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use consul_client::{ConsulClient, ConsulError, KvPair};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct FakeConsul {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    required_token: Option<String>,
}

impl FakeConsul {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.required_token {
            None => true,
            Some(token) => headers
                .get("X-Consul-Token")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == token),
        }
    }
}

async fn get_kv(
    State(fake): State<FakeConsul>,
    Path(key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !fake.authorized(&headers) {
        return (StatusCode::FORBIDDEN, "ACL not found").into_response();
    }
    let entries = fake.entries.lock().unwrap();
    let pairs: Vec<KvPair> = if query.contains_key("recurse") {
        entries
            .iter()
            .filter(|(k, _)| k.starts_with(&key))
            .map(|(k, v)| KvPair::from_raw(k.clone(), v, 1))
            .collect()
    } else {
        entries
            .get(&key)
            .map(|v| KvPair::from_raw(key.clone(), v, 1))
            .into_iter()
            .collect()
    };
    if pairs.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(pairs).into_response()
}

async fn put_kv(
    State(fake): State<FakeConsul>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !fake.authorized(&headers) {
        return (StatusCode::FORBIDDEN, "ACL not found").into_response();
    }
    fake.entries.lock().unwrap().insert(key, body.to_vec());
    Json(true).into_response()
}

async fn leader() -> Json<&'static str> {
    Json("127.0.0.1:8300")
}

async fn spawn_fake(fake: FakeConsul) -> String {
    let app = Router::new()
        .route("/v1/kv/{*key}", get(get_kv).put(put_kv))
        .route("/v1/status/leader", get(leader))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

#[tokio::test]
async fn test_put_and_list_round_trip_through_http() {
    let fake = FakeConsul::default();
    let address = spawn_fake(fake.clone()).await;
    let client = ConsulClient::new(address, None).unwrap();

    client.put_key("dhcp/leases/aa:bb:cc:dd:ee:01", b"first").await.unwrap();
    client.put_key("dhcp/leases/aa:bb:cc:dd:ee:02", b"second").await.unwrap();
    client.put_key("dhcp/other/aa:bb:cc:dd:ee:03", b"third").await.unwrap();

    // The fake stores the decoded path, so colons arrive intact
    assert!(fake.entries.lock().unwrap().contains_key("dhcp/leases/aa:bb:cc:dd:ee:01"));

    let pairs = client.list_prefix("dhcp/leases/").await.unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].decoded_value().unwrap(), b"first".to_vec());
    assert_eq!(pairs[1].decoded_value().unwrap(), b"second".to_vec());
}

#[tokio::test]
async fn test_missing_prefix_is_empty() {
    let address = spawn_fake(FakeConsul::default()).await;
    let client = ConsulClient::new(address, None).unwrap();

    assert!(client.list_prefix("nothing/here/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_base_url_with_trailing_slash_reaches_the_agent() {
    let fake = FakeConsul::default();
    fake.entries
        .lock()
        .unwrap()
        .insert("dhcp/leases/01:02".to_string(), b"value".to_vec());
    let address = spawn_fake(fake).await;
    let client = ConsulClient::new(format!("http://{}/", address), None).unwrap();

    let pairs = client.list_prefix("dhcp/leases/").await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].key, "dhcp/leases/01:02");
    assert_eq!(pairs[0].decoded_value().unwrap(), b"value".to_vec());
}

#[tokio::test]
async fn test_token_is_sent_and_rejection_is_reported() {
    let fake = FakeConsul {
        required_token: Some("s3cr3t".to_string()),
        ..Default::default()
    };
    let address = spawn_fake(fake).await;

    let anonymous = ConsulClient::new(address.clone(), None).unwrap();
    assert!(matches!(
        anonymous.put_key("k", b"v").await,
        Err(ConsulError::PermissionDenied(_))
    ));

    let authorized = ConsulClient::new(address, Some("s3cr3t".to_string())).unwrap();
    authorized.put_key("k", b"v").await.unwrap();
    assert_eq!(authorized.check_leader().await.unwrap(), "127.0.0.1:8300");
}

#[tokio::test]
async fn test_unreachable_agent_is_an_http_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = ConsulClient::new(address, None).unwrap();
    assert!(matches!(client.put_key("k", b"v").await, Err(ConsulError::Http(_))));
}
