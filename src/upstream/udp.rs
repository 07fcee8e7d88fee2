use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::proto::{Packet, Qr, Question};

use super::ResolverError;

/// Largest datagram we expect from an upstream server.
const MAX_DATAGRAM_SIZE: usize = 1500;

#[derive(Debug)]
pub struct UdpResolver {
    pub addr: SocketAddr,
    pub timeout: Duration,
}

impl UdpResolver {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub async fn resolve(&self, question: &Question) -> Result<Packet, ResolverError> {
        let local_addr = match self.addr {
            SocketAddr::V4(_) => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)),
        };

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(self.addr).await?;

        let transaction_id = rand::random();
        let packet = Packet::query(transaction_id, question.clone());

        let mut buf = Vec::new();
        packet.encode(&mut buf);

        socket.send(&buf).await?;

        let mut buf = vec![0; MAX_DATAGRAM_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(err) => {
                    tracing::warn!("malformed datagram from upstream {}: {}", self.addr, err);
                    continue;
                }
            };

            // The caller's timeout bounds how long we keep waiting for the real answer.
            if packet.transaction_id != transaction_id || packet.qr != Qr::Response {
                tracing::warn!(
                    "ignoring unexpected datagram from upstream {} (id {:#06x})",
                    self.addr,
                    packet.transaction_id
                );
                continue;
            }

            if packet.truncated {
                return Err(ResolverError::Truncated);
            }

            return Ok(packet);
        }
    }
}
