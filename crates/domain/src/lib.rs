//! Ferrous Forward Domain Layer
pub mod config;
pub mod dns_protocol;
pub mod errors;
pub mod zone;

pub use config::{Config, ForwardZoneConfig};
pub use dns_protocol::{ClientTransport, DnsProtocol, TransportKind};
pub use errors::DomainError;
pub use zone::ZoneName;
