//! dane-dns - caching DNS resolver for DANE
//!
//! This crate provides the resolver a DANE-validating TLS proxy relies on.
//! It forwards queries to one validating upstream and reports the
//! "Authenticated Data" (AD) flag of each answer, so TLSA records are only
//! used when the upstream vouched for them.
//!
//! Features:
//! - Upstreams over UDP, TCP, DoT (DNS over TLS) and DoH (DNS over HTTPS)
//! - Bounded per-record-type caching with TTL expiry
//! - Concurrent A/AAAA lookups that tolerate one family failing
//! - TLSA lookups that drop unauthenticated answers
//! - Special-use domains (`.test`, `.example`, `.invalid`, `.localhost`) are
//!   never sent upstream
//!
//! # Example
//!
//! ```no_run
//! use dane_dns::Resolver;
//!
//! # async fn example() -> dane_dns::Result<()> {
//! let resolver = Resolver::new("tls://dns.quad9.net")?;
//!
//! let ips = resolver.lookup_ip("example.com").await?;
//!
//! // Empty unless the upstream authenticated the answer
//! let tlsa = resolver.lookup_tlsa("443", "tcp", "example.com").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Upstream Formats
//!
//! - `8.8.8.8`, `8.8.8.8:5353`, `udp://8.8.8.8` - UDP, port 53 by default
//! - `tcp://8.8.8.8` - TCP, port 53 by default
//! - `tls://dns.quad9.net` - DoT, port 853 by default
//! - `https://cloudflare-dns.com` - DoH, queries go to `/dns-query`

mod cache;
mod config;
mod doh;
pub mod error;
pub mod exchange;
mod lookup;
mod policy;
mod resolver;
mod ttl;

pub use cache::{CacheEntry, CacheStats, CachedType, RecordCache, TypeCaches, DEFAULT_MAX_ENTRIES};
pub use config::{ResolverConfig, ServerTarget, Transport};
pub use doh::DohTransport;
pub use error::{Error, Result};
pub use exchange::{Exchanged, Exchanger, NetworkExchanger, MAX_ATTEMPTS};
pub use lookup::tlsa_name;
pub use policy::should_resolve;
pub use resolver::{Answer, BoxError, Resolver, Verify, EDNS_PAYLOAD_SIZE};
pub use ttl::{min_ttl, MAX_TTL, MIN_TTL};
