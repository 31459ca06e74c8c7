#![allow(dead_code)]
use hickory_proto::op::{Edns, Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;

pub const MOCK_NSID: &[u8] = b"mock-upstream";

/// How the mock answers.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// A record with this address, AA/AD/RA set, CD echoed.
    Answer(Ipv4Addr),
    /// Reads queries and never replies.
    Silent,
    /// Empty reply with this rcode.
    Rcode(ResponseCode),
    /// Over UDP: empty reply with TC set. Over TCP: a normal answer.
    TruncateUdp(Ipv4Addr),
    /// Over UDP: a datagram with the wrong id, then the real answer.
    StrayThenAnswer(Ipv4Addr),
    /// Answers after a pause.
    Delayed(Ipv4Addr, Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenOver {
    Udp,
    Tcp,
}

#[derive(Debug, Clone)]
pub struct SeenQuery {
    pub over: SeenOver,
    pub message: Message,
}

struct Shared {
    behavior: Mutex<MockBehavior>,
    seen: Mutex<Vec<SeenQuery>>,
    tcp_connections: AtomicUsize,
}

/// Plain DNS upstream listening on UDP and TCP on the same port.
pub struct MockUpstream {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn start(behavior: MockBehavior) -> Self {
        let (udp, tcp) = bind_pair().await;
        let addr = udp.local_addr().unwrap();
        let shared = Arc::new(Shared {
            behavior: Mutex::new(behavior),
            seen: Mutex::new(Vec::new()),
            tcp_connections: AtomicUsize::new(0),
        });
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let udp_shared = shared.clone();
        let udp = Arc::new(udp);
        let tcp_shared = shared.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = udp.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { break };
                        let bytes = buf[..len].to_vec();
                        let shared = udp_shared.clone();
                        let socket = udp.clone();
                        tokio::spawn(async move {
                            for reply in answer(&shared, &bytes, SeenOver::Udp).await {
                                let _ = socket.send_to(&reply, peer).await;
                            }
                        });
                    }
                    accepted = tcp.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        tcp_shared.tcp_connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_tcp(stream, tcp_shared.clone()));
                    }
                }
            }
        });

        Self {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.shared.behavior.lock().unwrap() = behavior;
    }

    pub fn seen(&self) -> Vec<SeenQuery> {
        self.shared.seen.lock().unwrap().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.shared.seen.lock().unwrap().len()
    }

    pub fn tcp_connections(&self) -> usize {
        self.shared.tcp_connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn bind_pair() -> (UdpSocket, TcpListener) {
    for _ in 0..20 {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        if let Ok(tcp) = TcpListener::bind(addr).await {
            return (udp, tcp);
        }
    }
    panic!("could not bind UDP and TCP on the same port");
}

async fn serve_tcp(mut stream: TcpStream, shared: Arc<Shared>) {
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        // 0x16 starts a TLS handshake record; a plain DNS server would choke.
        if len_buf[0] == 0x16 {
            return;
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut bytes = vec![0u8; len];
        if stream.read_exact(&mut bytes).await.is_err() {
            return;
        }
        for reply in answer(&shared, &bytes, SeenOver::Tcp).await {
            let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
            framed.extend_from_slice(&reply);
            if stream.write_all(&framed).await.is_err() {
                return;
            }
        }
    }
}

async fn answer(shared: &Shared, bytes: &[u8], over: SeenOver) -> Vec<Vec<u8>> {
    let Ok(query) = Message::from_vec(bytes) else {
        return Vec::new();
    };
    shared.seen.lock().unwrap().push(SeenQuery {
        over,
        message: query.clone(),
    });

    let behavior = shared.behavior.lock().unwrap().clone();
    match behavior {
        MockBehavior::Answer(ip) => vec![encode(&reply(&query, Some(ip), ResponseCode::NoError))],
        MockBehavior::Silent => Vec::new(),
        MockBehavior::Rcode(rcode) => vec![encode(&reply(&query, None, rcode))],
        MockBehavior::TruncateUdp(ip) => match over {
            SeenOver::Udp => {
                let mut truncated = reply(&query, None, ResponseCode::NoError);
                truncated.set_truncated(true);
                vec![encode(&truncated)]
            }
            SeenOver::Tcp => vec![encode(&reply(&query, Some(ip), ResponseCode::NoError))],
        },
        MockBehavior::StrayThenAnswer(ip) => {
            let mut stray = reply(&query, Some(Ipv4Addr::new(203, 0, 113, 66)), ResponseCode::NoError);
            stray.set_id(query.id().wrapping_add(1));
            let mut replies = Vec::new();
            if over == SeenOver::Udp {
                replies.push(encode(&stray));
            }
            replies.push(encode(&reply(&query, Some(ip), ResponseCode::NoError)));
            replies
        }
        MockBehavior::Delayed(ip, delay) => {
            tokio::time::sleep(delay).await;
            vec![encode(&reply(&query, Some(ip), ResponseCode::NoError))]
        }
    }
}

/// Reply to `query`. When the query carried EDNS the reply carries an OPT
/// with the same DO bit and an NSID option.
pub fn reply(query: &Message, ip: Option<Ipv4Addr>, rcode: ResponseCode) -> Message {
    let mut reply = Message::new(query.id(), MessageType::Response, query.op_code());
    reply.set_authoritative(true);
    reply.set_recursion_desired(query.recursion_desired());
    reply.set_recursion_available(true);
    reply.set_authentic_data(true);
    reply.set_checking_disabled(query.checking_disabled());
    reply.set_response_code(rcode);
    reply.add_queries(query.queries().to_vec());

    if let (Some(ip), Some(question)) = (ip, query.queries().first()) {
        reply.add_answer(Record::from_rdata(question.name().clone(), 60, RData::A(A(ip))));
    }

    if let Some(query_edns) = query.extensions() {
        let mut edns = Edns::new();
        edns.set_max_payload(1232);
        edns.flags_mut().dnssec_ok = query_edns.flags().dnssec_ok;
        edns.options_mut()
            .insert(EdnsOption::Unknown(3, MOCK_NSID.to_vec()));
        reply.set_edns(edns);
    }
    reply
}

pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message.emit(&mut encoder).unwrap();
    buf
}
