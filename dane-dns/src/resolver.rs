//! Caching resolver that reports the upstream's AD flag
//!
//! Every lookup goes through the per-type cache first. On a miss the query is
//! sent with the AD bit set so a validating upstream reports whether it
//! authenticated the answer, and the outcome is cached until the minimum TTL
//! of the response runs out.

use std::sync::Arc;
use std::time::Instant;

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};

use crate::cache::{cache_key, CacheEntry, CacheStats, CachedType, TypeCaches, DEFAULT_MAX_ENTRIES};
use crate::config::{ResolverConfig, ServerTarget};
use crate::error::{Error, Result};
use crate::exchange::{Exchanger, NetworkExchanger};
use crate::ttl::min_ttl;

/// UDP payload size advertised through EDNS0
pub const EDNS_PAYLOAD_SIZE: u16 = 4096;

/// Boxed error returned by a [`Verify`] hook
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Inspects a raw response before it is used or cached
///
/// Implemented for any `Fn(&Message) -> Result<(), E>` closure.
pub trait Verify: Send + Sync {
    /// Fail if the response must not be trusted
    fn verify(&self, response: &Message) -> std::result::Result<(), BoxError>;
}

impl<F, E> Verify for F
where
    F: Fn(&Message) -> std::result::Result<(), E> + Send + Sync,
    E: Into<BoxError>,
{
    fn verify(&self, response: &Message) -> std::result::Result<(), BoxError> {
        self(response).map_err(Into::into)
    }
}

/// Records returned by a lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Answer section of the response
    pub records: Vec<Record>,
    /// Whether the upstream set the AD flag
    pub authenticated: bool,
}

/// Caching stub resolver for DANE
pub struct Resolver {
    exchanger: Arc<dyn Exchanger>,
    target: ServerTarget,
    caches: TypeCaches,
    verify: Option<Arc<dyn Verify>>,
}

impl Resolver {
    /// Create a resolver that forwards to `server`
    ///
    /// `server` accepts any format understood by [`ServerTarget::parse`].
    pub fn new(server: &str) -> Result<Self> {
        let target = ServerTarget::parse(server)?;
        let exchanger = NetworkExchanger::new()?;

        log::info!("Creating AD resolver with upstream {}", target);

        Ok(Self::with_exchanger(target, Arc::new(exchanger)))
    }

    /// Create a resolver from configuration
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(&config.server)?.with_cache_size(config.cache_size))
    }

    /// Create a resolver that uses `exchanger` to reach `target`
    pub fn with_exchanger(target: ServerTarget, exchanger: Arc<dyn Exchanger>) -> Self {
        Self {
            exchanger,
            target,
            caches: TypeCaches::new(DEFAULT_MAX_ENTRIES),
            verify: None,
        }
    }

    /// Install a hook that runs on every raw response before caching
    pub fn with_verify(mut self, verify: impl Verify + 'static) -> Self {
        self.verify = Some(Arc::new(verify));
        self
    }

    /// Bound each record type's cache at `max_entries`
    ///
    /// Replaces the caches, so call it before the first lookup.
    pub fn with_cache_size(mut self, max_entries: usize) -> Self {
        self.caches = TypeCaches::new(max_entries);
        self
    }

    /// The upstream this resolver forwards to
    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    /// Statistics of the cache for `kind`
    pub fn cache_stats(&self, kind: CachedType) -> CacheStats {
        self.caches.get(kind).stats()
    }

    /// Drop every cached answer
    pub fn clear_cache(&self) {
        self.caches.clear();
    }

    /// Look up `name` records of type `record_type`
    ///
    /// Only A, AAAA and TLSA lookups are supported.
    pub async fn lookup(&self, name: &str, record_type: RecordType) -> Result<Answer> {
        let kind = CachedType::try_from(record_type)?;
        let key = cache_key(name);

        if let Some(answer) = self.check_cache(kind, &key) {
            log::debug!("DNS cache hit for {} {}", key, record_type);
            return Ok(answer);
        }

        log::debug!("DNS cache miss for {} {}", key, record_type);

        let query = build_query(&key, record_type)?;
        let exchanged = self.exchanger.exchange(&query, &self.target).await?;
        let response = exchanged.message;

        log::debug!(
            "DNS response for {} {} from {}: {} (ad={}, rtt={:?})",
            key,
            record_type,
            self.target,
            response.response_code(),
            response.authentic_data(),
            exchanged.rtt
        );

        if let Some(verify) = &self.verify {
            if let Err(e) = verify.verify(&response) {
                log::warn!("Rejected DNS response for {} {}: {}", key, record_type, e);
                return Err(Error::Verification(e.to_string()));
            }
        }

        if response.truncated() {
            return Err(Error::Truncated);
        }

        match response.response_code() {
            ResponseCode::ServFail => Err(Error::ServFail),
            ResponseCode::NoError | ResponseCode::NXDomain => {
                let entry = CacheEntry::new(
                    response.answers().to_vec(),
                    response.authentic_data(),
                    min_ttl(&response),
                );
                let answer = Answer {
                    records: entry.records.clone(),
                    authenticated: entry.secure,
                };

                self.caches.get(kind).set(key, entry);

                Ok(answer)
            }
            code => Err(Error::UnexpectedRcode(code)),
        }
    }

    /// Return a fresh cached answer, removing the entry if it has expired
    fn check_cache(&self, kind: CachedType, key: &str) -> Option<Answer> {
        let cache = self.caches.get(kind);
        let entry = cache.get(key)?;

        if entry.is_expired_at(Instant::now()) {
            cache.remove_if_same(key, &entry);
            return None;
        }

        Some(Answer {
            records: entry.records.clone(),
            authenticated: entry.secure,
        })
    }
}

/// Build a recursive query asking for the upstream's trust assessment
fn build_query(fqdn: &str, record_type: RecordType) -> Result<Message> {
    let name = Name::from_ascii(fqdn)
        .map_err(|e| Error::InvalidName(format!("{}: {}", fqdn, e)))?;

    let mut edns = Edns::new();
    edns.set_version(0);
    edns.set_max_payload(EDNS_PAYLOAD_SIZE);

    let mut message = Message::new();
    message.set_id(rand::random());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.add_query(Query::query(name, record_type));
    message.set_recursion_desired(true);
    message.set_authentic_data(true);
    *message.extensions_mut() = Some(edns);

    Ok(message)
}
