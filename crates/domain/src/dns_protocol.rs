use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_TLS_PORT: u16 = 853;

/// Transport the client used to reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientTransport {
    Udp,
    Tcp,
}

/// Concrete wire transport used for one upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
    Tls,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
        }
    }

    /// Stream transports carry a two-byte length prefix and keep their
    /// connections across exchanges.
    pub fn is_stream(&self) -> bool {
        !matches!(self, Self::Udp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream endpoint as written in configuration.
///
/// `Plain` endpoints (`dns://` or a bare address) follow the client's
/// transport; the other variants pin it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    Plain {
        addr: SocketAddr,
    },
    Udp {
        addr: SocketAddr,
    },
    Tcp {
        addr: SocketAddr,
    },
    Tls {
        addr: SocketAddr,
        server_name: Option<Arc<str>>,
    },
}

impl DnsProtocol {
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            DnsProtocol::Plain { addr }
            | DnsProtocol::Udp { addr }
            | DnsProtocol::Tcp { addr }
            | DnsProtocol::Tls { addr, .. } => *addr,
        }
    }

    pub fn server_name(&self) -> Option<&str> {
        match self {
            DnsProtocol::Tls { server_name, .. } => server_name.as_deref(),
            _ => None,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            DnsProtocol::Plain { .. } => "DNS",
            DnsProtocol::Udp { .. } => "UDP",
            DnsProtocol::Tcp { .. } => "TCP",
            DnsProtocol::Tls { .. } => "TLS",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, DnsProtocol::Tls { .. })
    }

    /// Picks the wire transport for one exchange.
    ///
    /// `force_tcp` wins over `prefer_udp`; both only affect plain endpoints.
    pub fn transport_for(
        &self,
        client: ClientTransport,
        force_tcp: bool,
        prefer_udp: bool,
    ) -> TransportKind {
        match self {
            DnsProtocol::Udp { .. } => TransportKind::Udp,
            DnsProtocol::Tcp { .. } => TransportKind::Tcp,
            DnsProtocol::Tls { .. } => TransportKind::Tls,
            DnsProtocol::Plain { .. } if force_tcp => TransportKind::Tcp,
            DnsProtocol::Plain { .. } if prefer_udp => TransportKind::Udp,
            DnsProtocol::Plain { .. } => match client {
                ClientTransport::Udp => TransportKind::Udp,
                ClientTransport::Tcp => TransportKind::Tcp,
            },
        }
    }

    /// Returns a copy carrying `name` when no per-endpoint name was given.
    pub fn with_default_server_name(&self, name: Option<&str>) -> Self {
        match (self, name) {
            (DnsProtocol::Tls { addr, server_name: None }, Some(name)) => DnsProtocol::Tls {
                addr: *addr,
                server_name: Some(name.into()),
            },
            _ => self.clone(),
        }
    }
}

fn parse_socket_addr(s: &str, default_port: u16) -> Result<SocketAddr, String> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let bare = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s);
    bare.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| format!("Invalid address '{}': expected IP or IP:PORT", s))
}

impl FromStr for DnsProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("tls://") {
            let (addr_str, server_name) = match rest.split_once('#') {
                Some((addr, name)) if !name.is_empty() => (addr, Some(Arc::<str>::from(name))),
                Some(_) => return Err(format!("Empty TLS server name in '{}'", s)),
                None => (rest, None),
            };
            let addr = parse_socket_addr(addr_str, DEFAULT_TLS_PORT)
                .map_err(|e| format!("Invalid TLS endpoint '{}': {}", s, e))?;
            return Ok(DnsProtocol::Tls { addr, server_name });
        }
        if let Some(rest) = s.strip_prefix("udp://") {
            let addr = parse_socket_addr(rest, DEFAULT_DNS_PORT)
                .map_err(|e| format!("Invalid UDP endpoint '{}': {}", s, e))?;
            return Ok(DnsProtocol::Udp { addr });
        }
        if let Some(rest) = s.strip_prefix("tcp://") {
            let addr = parse_socket_addr(rest, DEFAULT_DNS_PORT)
                .map_err(|e| format!("Invalid TCP endpoint '{}': {}", s, e))?;
            return Ok(DnsProtocol::Tcp { addr });
        }
        let rest = s.strip_prefix("dns://").unwrap_or(s);
        if rest.contains("://") {
            return Err(format!(
                "Unsupported upstream scheme in '{}'. Expected: dns://, udp://, tcp://, tls:// or IP[:PORT]",
                s
            ));
        }
        let addr = parse_socket_addr(rest, DEFAULT_DNS_PORT)?;
        Ok(DnsProtocol::Plain { addr })
    }
}

impl fmt::Display for DnsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsProtocol::Plain { addr } => write!(f, "dns://{}", addr),
            DnsProtocol::Udp { addr } => write!(f, "udp://{}", addr),
            DnsProtocol::Tcp { addr } => write!(f, "tcp://{}", addr),
            DnsProtocol::Tls {
                addr,
                server_name: Some(name),
            } => write!(f, "tls://{}#{}", addr, name),
            DnsProtocol::Tls { addr, .. } => write!(f, "tls://{}", addr),
        }
    }
}
