//! consul-range DHCPv4 server
//!
//! Hands out addresses from a single range and keeps every lease in Consul KV.
//!
//! Usage: `consul-range-dhcpd <consul-url> <kv-prefix> <range-start> <range-end> <lease-time>`

mod error;
mod http;
mod server;

use crate::error::ServerError;
use crate::server::DhcpServer;
use consul_range::ConsulRange;
use prometheus::Registry;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting consul-range DHCPv4 server");

    // Load configuration from environment variables
    let bind_addr = parse_socket_addr(
        "DHCP_BIND_ADDR",
        &env::var("DHCP_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:67".to_string()),
    )?;
    let metrics_addr = parse_socket_addr(
        "METRICS_ADDR",
        &env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
    )?;
    let server_id = match env::var("DHCP_SERVER_ID") {
        Ok(raw) => raw.parse::<Ipv4Addr>().map_err(|_| {
            ServerError::InvalidConfig(format!("DHCP_SERVER_ID is not an IPv4 address: {}", raw))
        })?,
        Err(_) => match bind_addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                return Err(ServerError::InvalidConfig(
                    "DHCP_BIND_ADDR must be an IPv4 address".to_string(),
                ));
            }
        },
    };
    if server_id.is_unspecified() {
        warn!("Server identifier is 0.0.0.0, set DHCP_SERVER_ID to the interface address");
    }

    info!("Configuration:");
    info!("  DHCP bind address: {}", bind_addr);
    info!("  Server identifier: {}", server_id);
    info!("  Metrics address: {}", metrics_addr);

    // Set up the range and replay persisted leases before serving
    let args: Vec<String> = env::args().skip(1).collect();
    let registry = Registry::new();
    let plugin = ConsulRange::setup(&args, &registry).await?;

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| ServerError::Bind { addr: bind_addr, source })?;
    socket.set_broadcast(true)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = http::serve(metrics_addr, registry, metrics_shutdown).await {
            error!("Metrics endpoint failed: {}", e);
        }
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let server = Arc::new(DhcpServer::new(Arc::new(plugin), server_id));
    server.run(socket, shutdown_rx).await
}

fn parse_socket_addr(name: &str, raw: &str) -> Result<SocketAddr, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::InvalidConfig(format!("{} is not a socket address: {}", name, raw)))
}
