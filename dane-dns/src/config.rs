//! Upstream server configuration parsing
//!
//! Parses upstream specifications in the following formats:
//! - `host` or `host:port` - UDP DNS server, port 53 by default
//! - `udp://host[:port]` - UDP DNS server
//! - `tcp://host[:port]` - TCP DNS server
//! - `tls://host[:port]` - DNS over TLS, port 853 by default
//! - `https://host[:port][/path]` - DNS over HTTPS

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::error::{Error, Result};

/// Default port for plain DNS over UDP and TCP
pub const DNS_PORT: u16 = 53;

/// Default port for DNS over TLS
pub const DOT_PORT: u16 = 853;

/// Wire transport used to reach the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transport {
    /// Plain DNS over UDP
    #[default]
    Udp,

    /// Plain DNS over TCP
    Tcp,

    /// DNS over TLS
    Tls,

    /// DNS over HTTPS
    Https,
}

impl Transport {
    /// URI scheme naming this transport
    pub fn scheme(&self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
            Transport::Tls => "tls",
            Transport::Https => "https",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// The upstream server the resolver forwards to
///
/// `address` is `host:port` for UDP, TCP and TLS, and `https://host[:port]`
/// for DNS over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    address: String,
    transport: Transport,
}

impl ServerTarget {
    /// Create a target from an already normalized address
    pub fn new(address: impl Into<String>, transport: Transport) -> Self {
        Self {
            address: address.into(),
            transport,
        }
    }

    /// Parse a server specification
    ///
    /// Specifications that are not URIs fall back to `host[:port]` over UDP.
    /// A URI with an unknown scheme is rejected.
    ///
    /// ```
    /// use dane_dns::{ServerTarget, Transport};
    ///
    /// let target = ServerTarget::parse("tls://dns.example.net").unwrap();
    /// assert_eq!(target.address(), "dns.example.net:853");
    /// assert_eq!(target.transport(), Transport::Tls);
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        match parse_address(spec) {
            Ok(target) => Ok(target),
            Err(Error::Parse(_)) => {
                let address = parse_simple_addr(spec)?;
                Ok(Self::new(address, Transport::Udp))
            }
            Err(e) => Err(e),
        }
    }

    /// Network address of the upstream
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Transport used to reach the upstream
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Host part of the address, used as the TLS server name
    pub fn server_name(&self) -> &str {
        let authority = match self.address.split_once("://") {
            Some((_, rest)) => rest,
            None => &self.address,
        };
        let (host, _) = split_host_port(authority);
        host
    }
}

impl std::fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transport {
            Transport::Https => write!(f, "{}", self.address),
            transport => write!(f, "{}://{}", transport, self.address),
        }
    }
}

impl FromStr for ServerTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse a `scheme://host[:port]` specification
fn parse_address(spec: &str) -> Result<ServerTarget> {
    let (scheme, rest) = spec
        .split_once("://")
        .ok_or_else(|| Error::Parse(format!("missing scheme in '{}'", spec)))?;

    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(Error::Parse(format!("invalid scheme in '{}'", spec)));
    }

    // Only the authority matters, a path is dropped
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    validate_authority(authority)?;

    let (transport, default_port) = match scheme.to_ascii_lowercase().as_str() {
        "udp" => (Transport::Udp, DNS_PORT),
        "tcp" => (Transport::Tcp, DNS_PORT),
        "tls" => (Transport::Tls, DOT_PORT),
        "https" => {
            return Ok(ServerTarget::new(
                format!("https://{}", authority),
                Transport::Https,
            ));
        }
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };

    let (host, port) = split_host_port(authority);
    let address = match port {
        Some(_) => authority.to_string(),
        None => join_host_port(host, default_port),
    };

    Ok(ServerTarget::new(address, transport))
}

/// Parse a bare `host[:port]`, adding port 53 when none is given
fn parse_simple_addr(spec: &str) -> Result<String> {
    if spec.contains("://") {
        return Err(Error::Parse(format!("malformed server address '{}'", spec)));
    }

    // Unbracketed IPv6 literal
    if let Ok(ip) = spec.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT).to_string());
    }

    validate_authority(spec)?;

    let (host, port) = split_host_port(spec);
    match port {
        Some(_) => Ok(spec.to_string()),
        None => Ok(join_host_port(host, DNS_PORT)),
    }
}

fn validate_authority(authority: &str) -> Result<()> {
    if authority.is_empty() {
        return Err(Error::Parse("empty host".into()));
    }

    if authority.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(Error::Parse(format!("invalid host '{}'", authority)));
    }

    let (host, _) = split_host_port(authority);
    if host.is_empty() {
        return Err(Error::Parse(format!("empty host in '{}'", authority)));
    }

    // A trailing colon must be followed by a port
    if let Some(port) = port_part(authority) {
        port.parse::<u16>()
            .map_err(|e| Error::Parse(format!("invalid port '{}': {}", port, e)))?;
    }

    Ok(())
}

/// The text after the host, if the authority carries a port
fn port_part(authority: &str) -> Option<&str> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (_, after) = rest.split_once(']')?;
        return after.strip_prefix(':');
    }

    match authority.matches(':').count() {
        1 => authority.rsplit_once(':').map(|(_, port)| port),
        _ => None,
    }
}

/// Split an authority into host (brackets removed) and port
fn split_host_port(authority: &str) -> (&str, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, after)) => {
                let port = after.strip_prefix(':').and_then(|p| p.parse().ok());
                (host, port)
            }
            None => (authority, None),
        };
    }

    if authority.matches(':').count() == 1 {
        if let Some((host, port)) = authority.rsplit_once(':') {
            return (host, port.parse().ok());
        }
    }

    (authority, None)
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn default_server() -> String {
    "1.1.1.1".to_string()
}

fn default_cache_size() -> usize {
    DEFAULT_MAX_ENTRIES
}

/// Resolver settings
///
/// # Example Configuration
///
/// ```toml
/// # Validating upstream, any format accepted by ServerTarget::parse
/// server = "https://dns.example.net/dns-query"
///
/// # Maximum cached answers per record type
/// cache_size = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upstream server specification
    #[serde(default = "default_server")]
    pub server: String,

    /// Maximum number of cached answers for each record type
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            cache_size: default_cache_size(),
        }
    }
}

impl ResolverConfig {
    /// Parse settings from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check that the settings can build a resolver
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(Error::Config("server cannot be empty".into()));
        }
        if self.cache_size == 0 {
            return Err(Error::Config("cache_size cannot be 0".into()));
        }
        self.target().map(|_| ())
    }

    /// Parse the configured server
    pub fn target(&self) -> Result<ServerTarget> {
        ServerTarget::parse(&self.server)
    }
}
