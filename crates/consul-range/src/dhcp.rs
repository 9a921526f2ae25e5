//! DHCPv4 request adapter.
//!
//! Extracts the client identity from an inbound message and writes the
//! granted address and lease time into the reply.

use crate::plugin::ConsulRange;
use chrono::Utc;
use dhcproto::v4::{DhcpOption, Message, OptionCode};
use std::fmt::Write;
use std::time::Duration;
use tracing::error;

/// Render the client hardware address as lower-case colon-separated hex.
///
/// Only the first `hlen` octets of `chaddr` are used.
pub fn hardware_address(message: &Message) -> String {
    let chaddr = message.chaddr();
    let len = usize::from(message.hlen()).min(chaddr.len());
    format_hw_addr(&chaddr[..len])
}

/// Colon-separated lower-case hex, e.g. `aa:bb:cc:00:11:22`
pub fn format_hw_addr(octets: &[u8]) -> String {
    let mut out = String::with_capacity(octets.len() * 3);
    for (i, octet) in octets.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{:02x}", octet);
    }
    out
}

/// Hostname from option 12, empty when absent
pub fn requested_hostname(message: &Message) -> String {
    match message.opts().get(OptionCode::Hostname) {
        Some(DhcpOption::Hostname(name)) => name.clone(),
        _ => String::new(),
    }
}

/// Option 51 carries 32-bit seconds; setup caps the lifetime at
/// [`MAX_LEASE_DURATION`](crate::config::MAX_LEASE_DURATION).
fn lease_time_secs(lifetime: Duration) -> u32 {
    u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX)
}

impl ConsulRange {
    /// Fill in `resp` for `req`.
    ///
    /// Returns `None` when no address can be handed out, in which case the
    /// caller should not reply.
    pub async fn handle_v4(&self, req: &Message, mut resp: Message) -> Option<Message> {
        let hw_addr = hardware_address(req);
        let hostname = requested_hostname(req);

        let grant = match self.manager().lease(&hw_addr, &hostname, Utc::now()).await {
            Ok(grant) => grant,
            Err(e) => {
                error!("Could not lease an address to {}: {}", hw_addr, e);
                return None;
            }
        };

        resp.set_yiaddr(grant.address);
        resp.opts_mut()
            .insert(DhcpOption::AddressLeaseTime(lease_time_secs(grant.lifetime)));
        Some(resp)
    }
}
