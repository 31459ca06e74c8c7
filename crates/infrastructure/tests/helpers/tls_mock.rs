#![allow(dead_code)]
use super::dns_server_mock::{encode, reply};
use hickory_proto::op::{Message, ResponseCode};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

/// DNS-over-TLS upstream with a fresh self-signed certificate for
/// `localhost`. The CA file trusts exactly that certificate.
pub struct MockTlsUpstream {
    addr: SocketAddr,
    ca_file: NamedTempFile,
    handshakes: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockTlsUpstream {
    pub async fn start(answer: Ipv4Addr) -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_der: CertificateDer<'static> = certified.cert.der().clone();
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

        let mut ca_file = NamedTempFile::new().unwrap();
        ca_file.write_all(certified.cert.pem().as_bytes()).unwrap();
        ca_file.flush().unwrap();

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handshakes = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let counter = handshakes.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let acceptor = acceptor.clone();
                        let counter = counter.clone();
                        tokio::spawn(async move {
                            let Ok(mut tls) = acceptor.accept(stream).await else { return };
                            counter.fetch_add(1, Ordering::SeqCst);
                            loop {
                                let mut len_buf = [0u8; 2];
                                if tls.read_exact(&mut len_buf).await.is_err() {
                                    return;
                                }
                                let mut bytes = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                                if tls.read_exact(&mut bytes).await.is_err() {
                                    return;
                                }
                                let Ok(query) = Message::from_vec(&bytes) else { return };
                                let wire = encode(&reply(&query, Some(answer), ResponseCode::NoError));
                                let mut framed = (wire.len() as u16).to_be_bytes().to_vec();
                                framed.extend_from_slice(&wire);
                                if tls.write_all(&framed).await.is_err() {
                                    return;
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            ca_file,
            handshakes,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ca_file(&self) -> String {
        self.ca_file.path().to_string_lossy().into_owned()
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

impl Drop for MockTlsUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
