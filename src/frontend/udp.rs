use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::proto::Packet;
use crate::state::State;
use crate::upstream::Upstream;

use super::{OnError, handle_query};

const MAX_DATAGRAM_SIZE: usize = 1500;

/// Largest response sent over UDP, see RFC 1035 section 4.2.1.
const MAX_RESPONSE_SIZE: usize = 512;

#[derive(Debug)]
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    on_error: OnError,
}

impl UdpServer {
    pub async fn new(addr: SocketAddr, on_error: OnError) -> Result<Self, io::Error> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            on_error,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.socket.local_addr()
    }

    /// Serves queries forever. Every datagram is resolved in its own task.
    pub async fn poll<U>(&self, state: Arc<State<U>>)
    where
        U: Upstream + 'static,
    {
        loop {
            let mut buf = vec![0; MAX_DATAGRAM_SIZE];

            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(res) => res,
                Err(err) => {
                    tracing::error!("failed to receive datagram: {}", err);
                    continue;
                }
            };
            buf.truncate(len);

            let packet = match Packet::decode(&buf[..]) {
                Ok(packet) => packet,
                Err(err) => {
                    tracing::trace!("failed to decode packet from {}: {}", addr, err);
                    continue;
                }
            };

            state.metrics.requests_total_udp.inc();

            let socket = self.socket.clone();
            let state = state.clone();
            let on_error = self.on_error;
            tokio::spawn(async move {
                let Some(response) = handle_query(&state, packet, on_error).await else {
                    return;
                };

                let buf = encode_response(response);
                if let Err(err) = socket.send_to(&buf, addr).await {
                    tracing::error!("failed to send response to {}: {}", addr, err);
                }
            });
        }
    }
}

/// Encodes `packet` for a datagram.
///
/// A response that does not fit is sent without any records and with `TC` set, so that
/// the client retries over TCP.
fn encode_response(mut packet: Packet) -> Vec<u8> {
    let mut buf = Vec::new();
    packet.encode(&mut buf);

    if buf.len() > MAX_RESPONSE_SIZE {
        tracing::debug!(
            "truncating {} byte response {:#06x}",
            buf.len(),
            packet.transaction_id
        );

        packet.truncated = true;
        packet.answers.clear();
        packet.authority.clear();
        packet.additional.clear();

        buf.clear();
        packet.encode(&mut buf);
    }

    buf
}
