//! Address and TLSA lookups
//!
//! These are the entry points used by the DANE proxy. Both short-circuit
//! literal IP addresses and special-use domains before touching the cache or
//! the network.

use std::net::IpAddr;

use hickory_proto::rr::rdata::TLSA;
use hickory_proto::rr::{RData, RecordType};

use crate::error::{Error, Result};
use crate::policy::should_resolve;
use crate::resolver::Resolver;

/// Well-known service names accepted in place of a port number
const SERVICE_PORTS: &[(&str, u16)] = &[
    ("smtp", 25),
    ("http", 80),
    ("https", 443),
    ("smtps", 465),
    ("submission", 587),
    ("ldaps", 636),
    ("imaps", 993),
    ("pop3s", 995),
    ("xmpp-client", 5222),
    ("xmpp-server", 5269),
];

/// Build the DANE owner name `_<port>._<proto>.<name>.`
///
/// `service` is a port number or one of the service names `smtp`, `http`,
/// `https`, `smtps`, `submission`, `ldaps`, `imaps`, `pop3s`, `xmpp-client`
/// and `xmpp-server` (case-insensitive). Service names are not looked up in
/// the system services database, so any other name is an
/// [`Error::InvalidName`].
///
/// ```
/// use dane_dns::tlsa_name;
///
/// assert_eq!(tlsa_name("443", "tcp", "example.com").unwrap(), "_443._tcp.example.com.");
/// assert_eq!(tlsa_name("smtp", "tcp", "mail.example.com.").unwrap(), "_25._tcp.mail.example.com.");
/// ```
pub fn tlsa_name(service: &str, proto: &str, name: &str) -> Result<String> {
    let port = match service.parse::<u16>() {
        Ok(port) => port,
        Err(_) => SERVICE_PORTS
            .iter()
            .find(|(known, _)| service.eq_ignore_ascii_case(known))
            .map(|(_, port)| *port)
            .ok_or_else(|| Error::InvalidName(format!("unknown service '{}'", service)))?,
    };

    if proto.is_empty() || !proto.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidName(format!("invalid protocol '{}'", proto)));
    }

    let name = name.trim().trim_end_matches('.');
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".into()));
    }

    Ok(format!(
        "_{}._{}.{}.",
        port,
        proto.to_ascii_lowercase(),
        name
    ))
}

impl Resolver {
    /// Look up the IPv4 and IPv6 addresses of `hostname`
    ///
    /// Literal addresses are returned as-is. Special-use names are resolved
    /// by the operating system. Otherwise the A and AAAA lookups run
    /// concurrently and the call only fails if both of them fail, since many
    /// upstreams answer SERVFAIL for AAAA on IPv4-only names.
    pub async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if !should_resolve(hostname) {
            return lookup_system(hostname).await;
        }

        let (ipv4, ipv6) = tokio::join!(self.lookup_ipv4(hostname), self.lookup_ipv6(hostname));

        match (ipv4, ipv6) {
            (Err(ipv4), Err(ipv6)) => Err(Error::DualStack {
                ipv4: Box::new(ipv4),
                ipv6: Box::new(ipv6),
            }),
            (ipv4, ipv6) => {
                if let Err(e) = &ipv4 {
                    log::debug!("IPv4 lookup for {} failed: {}", hostname, e);
                }
                if let Err(e) = &ipv6 {
                    log::debug!("IPv6 lookup for {} failed: {}", hostname, e);
                }

                let mut ips = ipv4.unwrap_or_default();
                ips.extend(ipv6.unwrap_or_default());
                Ok(ips)
            }
        }
    }

    async fn lookup_ipv4(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        let answer = self.lookup(hostname, RecordType::A).await?;
        Ok(answer
            .records
            .iter()
            .filter_map(|r| match r.data() {
                RData::A(a) => Some(IpAddr::V4(a.0)),
                _ => None,
            })
            .collect())
    }

    async fn lookup_ipv6(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        let answer = self.lookup(hostname, RecordType::AAAA).await?;
        Ok(answer
            .records
            .iter()
            .filter_map(|r| match r.data() {
                RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
                _ => None,
            })
            .collect())
    }

    /// Look up the TLSA records for `service` over `proto` at `name`
    ///
    /// Returns no records, rather than an error, when DANE does not apply:
    /// for literal addresses, special-use names, and answers the upstream did
    /// not authenticate.
    pub async fn lookup_tlsa(&self, service: &str, proto: &str, name: &str) -> Result<Vec<TLSA>> {
        if name.parse::<IpAddr>().is_ok() || !should_resolve(name) {
            return Ok(Vec::new());
        }

        let qname = tlsa_name(service, proto, name)?;

        let answer = self
            .lookup(&qname, RecordType::TLSA)
            .await
            .map_err(|e| Error::Tlsa(Box::new(e)))?;

        if !answer.authenticated {
            log::debug!("Ignoring unauthenticated TLSA answer for {}", qname);
            return Ok(Vec::new());
        }

        Ok(answer
            .records
            .into_iter()
            .filter_map(|r| match r.into_data() {
                RData::TLSA(tlsa) => Some(tlsa),
                _ => None,
            })
            .collect())
    }
}

/// Resolve `hostname` through the operating system
async fn lookup_system(hostname: &str) -> Result<Vec<IpAddr>> {
    let addrs = tokio::net::lookup_host((hostname, 0))
        .await
        .map_err(|e| Error::System(e.to_string()))?;

    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !ips.contains(&addr.ip()) {
            ips.push(addr.ip());
        }
    }
    Ok(ips)
}
