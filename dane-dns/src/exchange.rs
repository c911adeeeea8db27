//! Query exchange with the upstream server
//!
//! The [`Exchanger`] trait is the seam between the resolver and the network.
//! [`NetworkExchanger`] talks UDP, TCP, DNS over TLS and DNS over HTTPS and
//! retries transport failures; the [`mock`] module provides a scripted
//! implementation for tests.

pub mod mock;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::config::{ServerTarget, Transport};
use crate::doh::DohTransport;
use crate::error::{Error, Result};

/// Number of tries before a transport failure is reported
pub const MAX_ATTEMPTS: usize = 3;

/// Timeout for each network step of a query
const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum UDP DNS response size
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Maximum TCP/DoT DNS response size
const MAX_TCP_RESPONSE_SIZE: usize = 65535;

/// A response together with the time it took to get it
#[derive(Debug, Clone)]
pub struct Exchanged {
    /// The decoded response
    pub message: Message,
    /// Round-trip time, zero when the transport does not measure it
    pub rtt: Duration,
}

/// Sends a query to the upstream and returns its response
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Exchange `query` with `target`
    async fn exchange(&self, query: &Message, target: &ServerTarget) -> Result<Exchanged>;
}

/// Exchanger backed by real sockets
pub struct NetworkExchanger {
    /// HTTP client for DoH
    doh: DohTransport,

    /// TLS config for DoT
    tls_config: Arc<rustls::ClientConfig>,
}

impl NetworkExchanger {
    /// Create an exchanger with webpki roots for TLS and HTTPS
    pub fn new() -> Result<Self> {
        let doh = DohTransport::new(DNS_TIMEOUT)?;

        let root_store = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("failed to create TLS config: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            doh,
            tls_config: Arc::new(tls_config),
        })
    }

    /// Make a single attempt over the target's transport
    async fn exchange_once(&self, query: &Message, target: &ServerTarget) -> Result<Exchanged> {
        let start = Instant::now();
        let response = match target.transport() {
            Transport::Https => {
                let message = self.doh.exchange(target.address(), query).await?;
                return Ok(Exchanged {
                    message,
                    rtt: Duration::ZERO,
                });
            }
            Transport::Udp => {
                let addr = resolve_upstream(target.address()).await?;
                query_udp(addr, &encode(query)?).await?
            }
            Transport::Tcp => {
                let addr = resolve_upstream(target.address()).await?;
                query_tcp(addr, &encode(query)?).await?
            }
            Transport::Tls => {
                let addr = resolve_upstream(target.address()).await?;
                let server_name = target.server_name();
                query_tls(addr, server_name, &encode(query)?, &self.tls_config).await?
            }
        };
        let rtt = start.elapsed();

        let message = Message::from_vec(&response).map_err(|e| Error::Decode(e.to_string()))?;
        if message.id() != query.id() {
            return Err(Error::Transport(format!(
                "response id {} does not match query id {}",
                message.id(),
                query.id()
            )));
        }

        Ok(Exchanged { message, rtt })
    }
}

#[async_trait]
impl Exchanger for NetworkExchanger {
    async fn exchange(&self, query: &Message, target: &ServerTarget) -> Result<Exchanged> {
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.exchange_once(query, target).await {
                Ok(exchanged) => return Ok(exchanged),
                Err(e) if e.is_retryable() => {
                    log::warn!(
                        "DNS exchange with {} failed (attempt {}/{}): {}",
                        target,
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Transport("no exchange attempted".into())))
    }
}

fn encode(query: &Message) -> Result<Vec<u8>> {
    query.to_vec().map_err(|e| Error::Encode(e.to_string()))
}

/// Resolve the upstream `host:port` to a socket address
async fn resolve_upstream(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    tokio::net::lookup_host(address)
        .await
        .map_err(|e| Error::Transport(format!("failed to resolve upstream {}: {}", address, e)))?
        .next()
        .ok_or_else(|| Error::Transport(format!("no addresses found for upstream {}", address)))
}

/// Send a DNS query over UDP
async fn query_udp(addr: SocketAddr, query: &[u8]) -> Result<Vec<u8>> {
    let bind_addr = if addr.is_ipv6() {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| Error::Transport(format!("failed to bind UDP socket: {}", e)))?;

    socket
        .connect(addr)
        .await
        .map_err(|e| Error::Transport(format!("failed to connect UDP socket to {}: {}", addr, e)))?;

    socket
        .send(query)
        .await
        .map_err(|e| Error::Transport(format!("failed to send DNS query: {}", e)))?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];

    match tokio::time::timeout(DNS_TIMEOUT, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => {
            buf.truncate(len);
            Ok(buf)
        }
        Ok(Err(e)) => Err(Error::Transport(format!(
            "failed to receive DNS response: {}",
            e
        ))),
        Err(_) => Err(Error::Transport("DNS query timed out".into())),
    }
}

async fn connect_tcp(addr: SocketAddr) -> Result<TcpStream> {
    match tokio::time::timeout(DNS_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Transport(format!(
            "TCP connect to {} failed: {}",
            addr, e
        ))),
        Err(_) => Err(Error::Transport("TCP connect timed out".into())),
    }
}

/// Send a DNS query over TCP
async fn query_tcp(addr: SocketAddr, query: &[u8]) -> Result<Vec<u8>> {
    let mut stream = connect_tcp(addr).await?;
    dns_over_stream(&mut stream, query).await
}

/// Send a DNS query over DoT
async fn query_tls(
    addr: SocketAddr,
    server_name: &str,
    query: &[u8],
    tls_config: &Arc<rustls::ClientConfig>,
) -> Result<Vec<u8>> {
    let tcp_stream = connect_tcp(addr).await?;

    let connector = tokio_rustls::TlsConnector::from(tls_config.clone());

    let server_name = rustls_pki_types::ServerName::try_from(server_name.to_string())
        .map_err(|e| Error::Config(format!("invalid DoT server name: {}", e)))?;

    let mut tls_stream =
        match tokio::time::timeout(DNS_TIMEOUT, connector.connect(server_name, tcp_stream)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                return Err(Error::Transport(format!("DoT TLS handshake failed: {}", e)));
            }
            Err(_) => return Err(Error::Transport("DoT TLS handshake timed out".into())),
        };

    dns_over_stream(&mut tls_stream, query).await
}

/// Send a length-prefixed DNS query over a stream and read the reply
async fn dns_over_stream<S>(stream: &mut S, query: &[u8]) -> Result<Vec<u8>>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let len = u16::try_from(query.len())
        .map_err(|_| Error::Encode(format!("query of {} bytes is too large", query.len())))?;
    let mut msg = Vec::with_capacity(2 + query.len());
    msg.extend_from_slice(&len.to_be_bytes());
    msg.extend_from_slice(query);

    stream
        .write_all(&msg)
        .await
        .map_err(|e| Error::Transport(format!("stream write failed: {}", e)))?;

    let mut len_buf = [0u8; 2];
    match tokio::time::timeout(DNS_TIMEOUT, stream.read_exact(&mut len_buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(Error::Transport(format!("stream read failed: {}", e))),
        Err(_) => return Err(Error::Transport("stream read timed out".into())),
    }

    let response_len = u16::from_be_bytes(len_buf) as usize;
    if response_len > MAX_TCP_RESPONSE_SIZE {
        return Err(Error::Decode("DNS response too large".into()));
    }

    let mut response = vec![0u8; response_len];
    match tokio::time::timeout(DNS_TIMEOUT, stream.read_exact(&mut response)).await {
        Ok(Ok(_)) => Ok(response),
        Ok(Err(e)) => Err(Error::Transport(format!("stream read failed: {}", e))),
        Err(_) => Err(Error::Transport("stream read timed out".into())),
    }
}
