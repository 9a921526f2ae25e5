//! DHCPv4 UDP server loop.
//!
//! Answers DISCOVER with OFFER and REQUEST with ACK, taking the address and
//! lease time from the range plugin. Every other message type is ignored.

use crate::error::ServerError;
use consul_range::ConsulRange;
use dhcproto::v4::{DhcpOption, Message, MessageType, Opcode, OptionCode};
use dhcproto::{Decodable, Encodable};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Client port replies are sent to
pub const CLIENT_PORT: u16 = 68;
/// Server port, also used when replying through a relay
pub const SERVER_PORT: u16 = 67;

/// DHCPv4 server backed by a [`ConsulRange`] plugin
#[derive(Debug)]
pub struct DhcpServer {
    plugin: Arc<ConsulRange>,
    server_id: Ipv4Addr,
}

impl DhcpServer {
    /// Create a server that identifies itself as `server_id`
    pub fn new(plugin: Arc<ConsulRange>, server_id: Ipv4Addr) -> Self {
        Self { plugin, server_id }
    }

    /// Receive requests on `socket` until `shutdown` flips to true.
    ///
    /// Each request is handled on its own task.
    pub async fn run(
        self: Arc<Self>,
        socket: UdpSocket,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let socket = Arc::new(socket);
        info!("DHCPv4 server listening on {}", socket.local_addr()?);

        let mut buf = [0u8; 1500];
        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            let data = buf[..len].to_vec();
                            let server = Arc::clone(&self);
                            let socket = Arc::clone(&socket);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_packet(&socket, &data, src).await {
                                    error!("Error handling DHCPv4 packet from {}: {}", src, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error receiving packet: {}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("DHCPv4 server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_packet(
        &self,
        socket: &UdpSocket,
        data: &[u8],
        src: SocketAddr,
    ) -> Result<(), ServerError> {
        let request = match Message::from_bytes(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping malformed DHCPv4 packet from {}: {}", src, e);
                return Ok(());
            }
        };

        let Some(reply) = self.reply(&request).await else {
            return Ok(());
        };

        let bytes = reply
            .to_vec()
            .map_err(|e| ServerError::Encode(e.to_string()))?;
        let dest = reply_destination(&request);
        socket.send_to(&bytes, dest).await?;
        debug!("Sent {} bytes to {}", bytes.len(), dest);
        Ok(())
    }

    /// Build the reply to `request`, or `None` if it should go unanswered.
    pub async fn reply(&self, request: &Message) -> Option<Message> {
        if request.opcode() != Opcode::BootRequest {
            return None;
        }

        let reply_type = match message_type(request) {
            Some(MessageType::Discover) => MessageType::Offer,
            Some(MessageType::Request) => MessageType::Ack,
            other => {
                debug!("Ignoring DHCPv4 message of type {:?}", other);
                return None;
            }
        };

        let base = base_reply(request, reply_type, self.server_id);
        self.plugin.handle_v4(request, base).await
    }
}

fn message_type(message: &Message) -> Option<MessageType> {
    match message.opts().get(OptionCode::MessageType) {
        Some(DhcpOption::MessageType(mt)) => Some(*mt),
        _ => None,
    }
}

/// Reply skeleton echoing the request's transaction fields.
pub fn base_reply(request: &Message, message_type: MessageType, server_id: Ipv4Addr) -> Message {
    let mut reply = Message::default();
    reply.set_opcode(Opcode::BootReply);
    reply.set_xid(request.xid());
    reply.set_flags(request.flags());
    reply.set_chaddr(request.chaddr());
    reply.set_giaddr(request.giaddr());
    reply
        .opts_mut()
        .insert(DhcpOption::MessageType(message_type));
    reply
        .opts_mut()
        .insert(DhcpOption::ServerIdentifier(server_id));
    reply
}

/// Relayed requests go back to the relay agent, everything else is broadcast.
pub fn reply_destination(request: &Message) -> SocketAddr {
    let relay = request.giaddr();
    if relay.is_unspecified() {
        SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT).into()
    } else {
        SocketAddrV4::new(relay, SERVER_PORT).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consul_client::MockConsulClient;
    use consul_range::PluginArgs;
    use prometheus::Registry;

    const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01];

    fn request(message_type: MessageType) -> Message {
        let mut msg = Message::new(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            &MAC,
        );
        msg.set_opcode(Opcode::BootRequest);
        msg.set_xid(0x1234_5678);
        msg.opts_mut().insert(DhcpOption::MessageType(message_type));
        msg
    }

    async fn server() -> DhcpServer {
        let args =
            PluginArgs::parse(&["http://mock-consul", "dhcp/leases", "10.0.0.2", "10.0.0.4", "1h"])
                .unwrap();
        let mock = MockConsulClient::new("http://mock-consul");
        let plugin = ConsulRange::with_client(args, Arc::new(mock), &Registry::new())
            .await
            .unwrap();
        DhcpServer::new(Arc::new(plugin), Ipv4Addr::new(10, 0, 0, 1))
    }

    #[tokio::test]
    async fn test_discover_gets_offer() {
        let server = server().await;
        let reply = server.reply(&request(MessageType::Discover)).await.unwrap();

        assert_eq!(reply.opcode(), Opcode::BootReply);
        assert_eq!(reply.xid(), 0x1234_5678);
        assert_eq!(reply.yiaddr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(message_type(&reply), Some(MessageType::Offer));
        assert!(matches!(
            reply.opts().get(OptionCode::ServerIdentifier),
            Some(DhcpOption::ServerIdentifier(id)) if *id == Ipv4Addr::new(10, 0, 0, 1)
        ));
    }

    #[tokio::test]
    async fn test_request_gets_ack_with_same_address() {
        let server = server().await;
        let offer = server.reply(&request(MessageType::Discover)).await.unwrap();
        let ack = server.reply(&request(MessageType::Request)).await.unwrap();

        assert_eq!(message_type(&ack), Some(MessageType::Ack));
        assert_eq!(ack.yiaddr(), offer.yiaddr());
    }

    #[tokio::test]
    async fn test_other_messages_are_ignored() {
        let server = server().await;
        assert!(server.reply(&request(MessageType::Release)).await.is_none());
        assert!(server.reply(&request(MessageType::Inform)).await.is_none());

        let mut reply_packet = request(MessageType::Discover);
        reply_packet.set_opcode(Opcode::BootReply);
        assert!(server.reply(&reply_packet).await.is_none());
    }

    #[test]
    fn test_reply_destination() {
        let mut msg = request(MessageType::Discover);
        assert_eq!(
            reply_destination(&msg),
            SocketAddr::from((Ipv4Addr::BROADCAST, CLIENT_PORT))
        );

        msg.set_giaddr(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(
            reply_destination(&msg),
            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 1), SERVER_PORT))
        );
    }
}
