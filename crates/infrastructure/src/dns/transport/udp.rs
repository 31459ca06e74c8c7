//! UDP transport (RFC 1035 §4.2.1). Messages are sent as-is, no framing.

use super::map_io_error;
use ferrous_forward_domain::DomainError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest datagram we accept from an upstream.
const MAX_UDP_RESPONSE_SIZE: usize = 65535;

/// A socket connected to one upstream, so datagrams from other sources are
/// filtered by the kernel.
pub struct UdpConnection {
    socket: UdpSocket,
    server: SocketAddr,
}

impl UdpConnection {
    pub async fn connect(server: SocketAddr) -> Result<Self, DomainError> {
        let bind_addr: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| map_io_error(server, e))?;
        socket
            .connect(server)
            .await
            .map_err(|e| map_io_error(server, e))?;

        Ok(Self { socket, server })
    }

    pub async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, DomainError> {
        self.socket
            .send(query)
            .await
            .map_err(|e| map_io_error(self.server, e))?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let len = self
                .socket
                .recv(&mut buf)
                .await
                .map_err(|e| map_io_error(self.server, e))?;

            if len >= 2 && query.len() >= 2 && buf[..2] == query[..2] {
                buf.truncate(len);
                return Ok(buf);
            }

            debug!(
                server = %self.server,
                len,
                "Discarding UDP datagram with unexpected id"
            );
        }
    }
}
