//! Upstream transports.
//!
//! A [`Connection`] carries exactly one exchange at a time. UDP connections
//! are connected sockets created per exchange; TCP and TLS connections are
//! reused through a [`ConnectionPool`].

pub mod connection_pool;
pub mod tcp;
pub mod tls;
pub mod udp;

use ferrous_forward_domain::{DomainError, TransportKind};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pub use connection_pool::{ConnectionPool, PoolSettings, PooledConnection};
pub use tls::TlsClientFactory;

enum Stream {
    Udp(udp::UdpConnection),
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub struct Connection {
    server: SocketAddr,
    stream: Stream,
}

impl Connection {
    pub fn kind(&self) -> TransportKind {
        match self.stream {
            Stream::Udp(_) => TransportKind::Udp,
            Stream::Tcp(_) => TransportKind::Tcp,
            Stream::Tls(_) => TransportKind::Tls,
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Writes `query` and returns the first reply carrying the same
    /// transaction id.
    ///
    /// Stray UDP datagrams with another id are skipped. On a stream any other
    /// id means the connection is out of sync and the exchange fails.
    pub async fn exchange(&mut self, query: &[u8]) -> Result<Vec<u8>, DomainError> {
        let server = self.server;
        let reply = match &mut self.stream {
            Stream::Udp(socket) => return socket.exchange(query).await,
            Stream::Tcp(stream) => {
                tcp::send_with_length_prefix(stream, query, server).await?;
                tcp::read_with_length_prefix(stream, server).await?
            }
            Stream::Tls(stream) => {
                tcp::send_with_length_prefix(stream.as_mut(), query, server).await?;
                tcp::read_with_length_prefix(stream.as_mut(), server).await?
            }
        };
        if !same_id(query, &reply) {
            return Err(DomainError::MismatchedResponse {
                server: server.to_string(),
            });
        }
        Ok(reply)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.server)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Everything needed to open a new connection to one upstream.
#[derive(Clone)]
pub struct UpstreamConnector {
    server: SocketAddr,
    kind: TransportKind,
    tls: Option<tls::TlsTarget>,
}

impl UpstreamConnector {
    pub fn udp(server: SocketAddr) -> Self {
        Self {
            server,
            kind: TransportKind::Udp,
            tls: None,
        }
    }

    pub fn tcp(server: SocketAddr) -> Self {
        Self {
            server,
            kind: TransportKind::Tcp,
            tls: None,
        }
    }

    pub fn tls(
        server: SocketAddr,
        factory: Arc<TlsClientFactory>,
        server_name: Option<&str>,
    ) -> Result<Self, DomainError> {
        let target = tls::TlsTarget::new(factory, server, server_name)?;
        Ok(Self {
            server,
            kind: TransportKind::Tls,
            tls: Some(target),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Opens a connection. Callers bound the time spent here.
    pub async fn connect(&self) -> Result<Connection, DomainError> {
        let stream = match (self.kind, &self.tls) {
            (TransportKind::Udp, _) => Stream::Udp(udp::UdpConnection::connect(self.server).await?),
            (TransportKind::Tcp, _) => Stream::Tcp(tcp::connect(self.server).await?),
            (TransportKind::Tls, Some(target)) => {
                Stream::Tls(Box::new(target.connect(self.server).await?))
            }
            (TransportKind::Tls, None) => {
                return Err(DomainError::ConfigError(format!(
                    "TLS upstream {} has no TLS client configuration",
                    self.server
                )))
            }
        };
        Ok(Connection {
            server: self.server,
            stream,
        })
    }
}

fn same_id(query: &[u8], reply: &[u8]) -> bool {
    query.len() >= 2 && reply.len() >= 2 && query[..2] == reply[..2]
}

pub(crate) fn map_io_error(server: SocketAddr, e: io::Error) -> DomainError {
    let server = server.to_string();
    match e.kind() {
        io::ErrorKind::ConnectionRefused => DomainError::TransportConnectionRefused { server },
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => DomainError::TransportConnectionReset { server },
        io::ErrorKind::TimedOut => DomainError::TransportTimeout { server },
        _ => DomainError::TransportError {
            server,
            reason: e.to_string(),
        },
    }
}
