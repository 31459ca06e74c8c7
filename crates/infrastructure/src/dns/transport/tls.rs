//! DNS-over-TLS client (RFC 7858)
//!
//! One `ClientConfig` is built per forward zone from its configuration and
//! shared by every TLS upstream of that zone, so rustls session resumption
//! works across connections. A failed handshake is always an error; there is
//! no fallback to plaintext.

use ferrous_forward_domain::DomainError;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

pub struct TlsClientFactory {
    config: Arc<ClientConfig>,
}

impl TlsClientFactory {
    /// Trusts the bundled web PKI roots plus every certificate in `ca_file`.
    pub fn new(ca_file: Option<&str>) -> Result<Self, DomainError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(path) = ca_file {
            for cert in load_pem_certificates(path)? {
                roots.add(cert).map_err(|e| {
                    DomainError::ConfigError(format!("Invalid CA certificate in {}: {}", path, e))
                })?;
            }
        }

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| DomainError::ConfigError(format!("TLS protocol setup failed: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
        })
    }

    fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }
}

fn load_pem_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>, DomainError> {
    let file = File::open(path)
        .map_err(|e| DomainError::ConfigError(format!("Cannot open CA file {}: {}", path, e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DomainError::ConfigError(format!("Cannot parse CA file {}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(DomainError::ConfigError(format!(
            "CA file {} contains no certificates",
            path
        )));
    }
    Ok(certs)
}

/// Resolved TLS identity of one upstream.
#[derive(Clone)]
pub(crate) struct TlsTarget {
    factory: Arc<TlsClientFactory>,
    server_name: ServerName<'static>,
}

impl TlsTarget {
    /// Without an explicit name the certificate must cover the IP address.
    pub(crate) fn new(
        factory: Arc<TlsClientFactory>,
        server: SocketAddr,
        server_name: Option<&str>,
    ) -> Result<Self, DomainError> {
        let server_name = match server_name {
            Some(name) => ServerName::try_from(name.to_string()).map_err(|e| {
                DomainError::ConfigError(format!("Invalid TLS server name '{}': {}", name, e))
            })?,
            None => ServerName::IpAddress(server.ip().into()),
        };
        Ok(Self {
            factory,
            server_name,
        })
    }

    pub(crate) async fn connect(
        &self,
        server: SocketAddr,
    ) -> Result<TlsStream<TcpStream>, DomainError> {
        let tcp_stream = super::tcp::connect(server).await?;

        let tls_stream = self
            .factory
            .connector()
            .connect(self.server_name.clone(), tcp_stream)
            .await
            .map_err(|e| DomainError::TlsHandshakeFailed {
                server: server.to_string(),
                reason: e.to_string(),
            })?;

        debug!(server = %server, server_name = ?self.server_name, "TLS connection established");
        Ok(tls_stream)
    }
}
