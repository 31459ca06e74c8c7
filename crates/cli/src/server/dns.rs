use ferrous_forward_domain::ClientTransport;
use ferrous_forward_infrastructure::dns::DnsServerHandler;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const MAX_UDP_QUERY: usize = 4096;

/// Serves DNS over UDP and TCP on `bind_addr` until `shutdown` fires.
pub async fn start_dns_server(
    bind_addr: SocketAddr,
    handler: DnsServerHandler,
    tcp_idle_timeout: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let udp_socket = Arc::new(create_udp_socket(domain, bind_addr)?);
    let tcp_listener = create_tcp_listener(domain, bind_addr)?;
    let handler = Arc::new(handler);

    info!(bind_address = %bind_addr, "DNS server listening on UDP and TCP");

    let mut join_set: JoinSet<()> = JoinSet::new();
    join_set.spawn(run_udp(udp_socket, handler.clone(), shutdown.clone()));
    join_set.spawn(run_tcp(tcp_listener, handler, tcp_idle_timeout, shutdown));

    while join_set.join_next().await.is_some() {}
    info!("DNS listeners stopped");
    Ok(())
}

async fn run_udp(socket: Arc<UdpSocket>, handler: Arc<DnsServerHandler>, shutdown: CancellationToken) {
    let mut recv_buf = [0u8; MAX_UDP_QUERY];

    loop {
        let (n, from) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut recv_buf) => match received {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // ICMP port-unreachable from a previous reply surfaces here on some platforms.
                    debug!(error = %e, "UDP recv error");
                    continue;
                }
            },
        };

        let query: Arc<[u8]> = Arc::from(&recv_buf[..n]);
        let handler = handler.clone();
        let socket = socket.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Some(response) = handler
                .handle_raw(&query, ClientTransport::Udp, from, &shutdown)
                .await
            {
                if let Err(e) = socket.send_to(&response, from).await {
                    debug!(client = %from, error = %e, "UDP send failed");
                }
            }
        });
    }
}

async fn run_tcp(
    listener: TcpListener,
    handler: Arc<DnsServerHandler>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "TCP accept error");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        let connection = shutdown.child_token();
        tokio::spawn(async move {
            let _guard = connection.clone().drop_guard();
            if let Err(e) = serve_tcp_client(stream, peer, &handler, idle_timeout, &connection).await {
                debug!(client = %peer, error = %e, "TCP client closed");
            }
        });
    }
}

/// Length-prefixed queries, answered in order. Closing the connection
/// cancels whatever is still in flight for it.
async fn serve_tcp_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &DnsServerHandler,
    idle_timeout: Duration,
    connection: &CancellationToken,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    loop {
        let mut len_buf = [0u8; 2];
        let read = tokio::select! {
            _ = connection.cancelled() => return Ok(()),
            read = tokio::time::timeout(idle_timeout, stream.read_exact(&mut len_buf)) => read,
        };
        match read {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(client = %peer, "TCP client idle, closing");
                return Ok(());
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        let mut query = vec![0u8; len];
        let read = tokio::select! {
            _ = connection.cancelled() => return Ok(()),
            read = tokio::time::timeout(idle_timeout, stream.read_exact(&mut query)) => read,
        };
        match read {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                debug!(client = %peer, "TCP client stalled mid-query, closing");
                return Ok(());
            }
        }

        let (mut reader, mut writer) = stream.split();
        let response = tokio::select! {
            response = handler.handle_raw(&query, ClientTransport::Tcp, peer, connection) => response,
            // A peer that hangs up mid-query cancels the upstream work.
            _ = wait_for_close(&mut reader) => {
                connection.cancel();
                return Ok(());
            }
        };

        let Some(response) = response else {
            continue;
        };
        let mut framed = Vec::with_capacity(response.len() + 2);
        framed.extend_from_slice(&(response.len() as u16).to_be_bytes());
        framed.extend_from_slice(&response);
        writer.write_all(&framed).await?;
    }
}

/// Resolves once the peer has closed its side. Pipelined bytes are not
/// consumed: it only peeks.
async fn wait_for_close(reader: &mut tokio::net::tcp::ReadHalf<'_>) {
    let mut probe = [0u8; 1];
    loop {
        match reader.peek(&mut probe).await {
            Ok(0) | Err(_) => return,
            Ok(_) => std::future::pending::<()>().await,
        }
    }
}

fn create_udp_socket(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(512 * 1024)?;
    socket.set_send_buffer_size(512 * 1024)?;
    socket.bind(&socket_addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

fn create_tcp_listener(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}
