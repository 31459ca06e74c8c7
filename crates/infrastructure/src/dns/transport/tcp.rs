//! TCP framing (RFC 1035 §4.2.2): every message carries a two-byte length
//! prefix. Shared by the TCP and TLS transports.

use super::map_io_error;
use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub async fn connect(server: SocketAddr) -> Result<TcpStream, DomainError> {
    let stream = TcpStream::connect(server)
        .await
        .map_err(|e| map_io_error(server, e))?;
    stream
        .set_nodelay(true)
        .map_err(|e| map_io_error(server, e))?;
    Ok(stream)
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
    server: SocketAddr,
) -> Result<(), DomainError>
where
    S: AsyncWriteExt + Unpin,
{
    if message_bytes.len() > MAX_TCP_MESSAGE_SIZE {
        return Err(DomainError::InvalidDnsQuery(format!(
            "Message too large for TCP: {} bytes",
            message_bytes.len()
        )));
    }

    let mut frame = Vec::with_capacity(message_bytes.len() + 2);
    frame.extend_from_slice(&(message_bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(message_bytes);

    stream
        .write_all(&frame)
        .await
        .map_err(|e| map_io_error(server, e))?;
    stream.flush().await.map_err(|e| map_io_error(server, e))?;
    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(
    stream: &mut S,
    server: SocketAddr,
) -> Result<Vec<u8>, DomainError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| map_io_error(server, e))?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    if response_len < 12 {
        return Err(DomainError::InvalidDnsResponse {
            server: server.to_string(),
            reason: format!("frame of {} bytes is shorter than a DNS header", response_len),
        });
    }

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| map_io_error(server, e))?;

    Ok(response)
}
