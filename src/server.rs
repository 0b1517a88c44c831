use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

use crate::proto_utils::{answer_strings, first_query, question_string, reply_to};
use crate::resolver::Resolver;

/// Maps resolver outcomes onto DNS replies.
#[derive(Clone)]
pub struct Proxy {
    resolver: Arc<dyn Resolver>,
}

impl Proxy {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Answer one request packet.
    ///
    /// No answer from the chain is an empty NOERROR reply; a resolver error is
    /// SERVFAIL. Requests without a question get FORMERR.
    pub async fn handle_packet(&self, packet: &[u8]) -> anyhow::Result<Bytes> {
        let request = Message::from_vec(packet).context("decode request")?;
        let reply = self.handle_message(&request).await;
        let out = reply.to_vec().context("encode reply")?;
        Ok(Bytes::from(out))
    }

    pub async fn handle_message(&self, request: &Message) -> Message {
        if request.message_type() != MessageType::Query || first_query(request).is_none() {
            let mut reply = reply_to(request);
            reply.set_response_code(ResponseCode::FormErr);
            return reply;
        }

        match self.resolver.resolve(request).await {
            Ok(Some(answer)) => {
                let mut reply = reply_to(request);
                reply.set_response_code(answer.response_code());
                reply.add_answers(answer.answers().iter().cloned());
                debug!(
                    question = %question_string(request),
                    answers = ?answer_strings(&reply),
                    "answered"
                );
                reply
            }
            Ok(None) => {
                debug!(question = %question_string(request), "no answer");
                reply_to(request)
            }
            Err(err) => {
                error!(question = %question_string(request), error = %err, "failed to handle request");
                let mut reply = reply_to(request);
                reply.set_response_code(ResponseCode::ServFail);
                reply
            }
        }
    }
}

// SO_REUSEPORT socket on unix, plain bind elsewhere
#[cfg(unix)]
pub fn create_reuseport_udp_socket(addr: SocketAddr) -> anyhow::Result<std::net::UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};
    use std::os::unix::io::AsRawFd;
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    use libc::{SO_REUSEPORT, SOL_SOCKET, c_int, c_void, setsockopt, socklen_t};
    let val: c_int = 1;
    let fd = socket.as_raw_fd();
    let ret = unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEPORT,
            &val as *const _ as *const c_void,
            std::mem::size_of_val(&val) as socklen_t,
        )
    };
    if ret != 0 {
        warn!(addr = %addr, "SO_REUSEPORT unavailable, continuing without it");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

#[cfg(not(unix))]
pub fn create_reuseport_udp_socket(addr: SocketAddr) -> anyhow::Result<std::net::UdpSocket> {
    let socket = std::net::UdpSocket::bind(addr)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Bind the sockets for `workers` UDP workers.
///
/// With port 0 the first socket picks the port and the others reuse it.
pub fn bind_udp(addr: SocketAddr, workers: usize) -> anyhow::Result<Vec<UdpSocket>> {
    let first = create_reuseport_udp_socket(addr)
        .with_context(|| format!("bind udp socket on {addr}"))?;
    let bound = first.local_addr()?;
    let mut sockets = vec![UdpSocket::from_std(first)?];

    // without SO_REUSEPORT only one socket can own the port
    if cfg!(unix) {
        for worker_id in 1..workers.max(1) {
            let std_socket = create_reuseport_udp_socket(bound)
                .with_context(|| format!("create udp socket for worker {}", worker_id))?;
            sockets.push(UdpSocket::from_std(std_socket)?);
        }
    }
    Ok(sockets)
}

/// Receive loop; every request is answered on its own task.
pub async fn run_udp_worker(worker_id: usize, socket: Arc<UdpSocket>, proxy: Proxy) -> anyhow::Result<()> {
    let mut buf = BytesMut::zeroed(4096);

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(err) => {
                debug!(worker_id, error = %err, "udp recv failed");
                continue;
            }
        };
        let packet = Bytes::copy_from_slice(&buf[..len]);
        let proxy = proxy.clone();
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            match proxy.handle_packet(&packet).await {
                Ok(resp) => {
                    if let Err(err) = socket.send_to(&resp, peer).await {
                        warn!(peer = %peer, error = %err, "udp send failed");
                    }
                }
                Err(err) => debug!(peer = %peer, error = %err, "dropping undecodable packet"),
            }
        });
    }
}
