use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ResolveError;
use crate::proto_utils::{answer_strings, question_string};
use crate::resolver::Resolver;

/// Per-upstream exchange settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOptions {
    pub timeout: Duration,
    pub default_port: u16,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            default_port: 53,
        }
    }
}

/// Append `default_port` to a bare host or IP.
///
/// Accepts `host`, `host:port`, `v4`, `v4:port`, `v6` and `[v6]:port`.
pub fn normalize_server(server: &str, default_port: u16) -> String {
    let server = server.trim();
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    // resolv.conf may carry a zone suffix, e.g. fe80::1%eth0
    let bare = server.split('%').next().unwrap_or(server);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return SocketAddr::new(ip, default_port).to_string();
    }
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{default_port}")
    }
}

/// Forwards every request to one upstream over UDP.
pub struct ForwardingResolver {
    server: String,
    timeout: Duration,
}

impl ForwardingResolver {
    pub fn new(server: &str, opts: ForwardOptions) -> Self {
        Self {
            server: normalize_server(server, opts.default_port),
            timeout: opts.timeout,
        }
    }

    async fn upstream_addr(&self) -> Result<SocketAddr, ResolveError> {
        if let Ok(addr) = self.server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let mut addrs = tokio::net::lookup_host(self.server.as_str())
            .await
            .map_err(|source| self.io_error(source))?;
        addrs.next().ok_or_else(|| {
            self.io_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "upstream host has no address",
            ))
        })
    }

    /// One UDP round trip on a fresh socket.
    async fn exchange(&self, packet: &[u8], id: u16) -> Result<Vec<u8>, ResolveError> {
        let addr = self.upstream_addr().await?;
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| self.io_error(e))?;
        let local: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        socket.bind(&local.into()).map_err(|e| self.io_error(e))?;
        socket.set_nonblocking(true).map_err(|e| self.io_error(e))?;
        let sock = UdpSocket::from_std(socket.into()).map_err(|e| self.io_error(e))?;

        sock.connect(addr).await.map_err(|e| self.io_error(e))?;
        sock.send(packet).await.map_err(|e| self.io_error(e))?;

        let mut buf = [0u8; 4096];
        let recv = timeout(self.timeout, async {
            loop {
                let size = sock.recv(&mut buf).await?;
                // stray datagrams with another id are skipped
                if size >= 2 && u16::from_be_bytes([buf[0], buf[1]]) == id {
                    return Ok::<_, std::io::Error>(buf[..size].to_vec());
                }
            }
        })
        .await;

        match recv {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(err)) => Err(self.io_error(err)),
            Err(_) => Err(ResolveError::Timeout {
                server: self.server.clone(),
                timeout: self.timeout,
            }),
        }
    }

    fn io_error(&self, source: std::io::Error) -> ResolveError {
        ResolveError::Io {
            server: self.server.clone(),
            source,
        }
    }
}

#[async_trait]
impl Resolver for ForwardingResolver {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        let question = question_string(request);
        let packet = request.to_vec()?;
        let res = self.exchange(&packet, request.id()).await;
        let bytes = match res {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(server = %self.server, question = %question, error = %err, "forward failed");
                return Err(err);
            }
        };
        let response = Message::from_vec(&bytes)?;
        debug!(
            server = %self.server,
            question = %question,
            answers = ?answer_strings(&response),
            "forwarded request"
        );
        Ok(Some(response))
    }

    fn describe(&self) -> String {
        format!("forward({})", self.server)
    }
}
