//! Mock exchanger for testing
//!
//! [`MockExchanger`] answers queries from a script keyed by record type and
//! records every query it sees, so resolver behaviour can be checked without
//! a network. The record builders in this module produce the responses.
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! use dane_dns::exchange::mock::{self, MockExchanger};
//! use dane_dns::{Resolver, ServerTarget};
//! use hickory_proto::rr::RecordType;
//!
//! # async fn example() -> dane_dns::Result<()> {
//! let mock = Arc::new(MockExchanger::new());
//! mock.respond(
//!     RecordType::A,
//!     mock::response(true, vec![mock::a_record("example.com.", Ipv4Addr::new(192, 0, 2, 1), 300)]),
//! );
//! mock.fail(RecordType::AAAA, "no route to host");
//!
//! let resolver = Resolver::with_exchanger(ServerTarget::parse("192.0.2.53")?, mock.clone());
//! let ips = resolver.lookup_ip("example.com").await?;
//! assert_eq!(ips.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::tlsa::{CertUsage, Matching, Selector};
use hickory_proto::rr::rdata::{A, AAAA, TLSA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use parking_lot::Mutex;

use super::{Exchanged, Exchanger};
use crate::config::ServerTarget;
use crate::error::{Error, Result};

/// Scripted outcome of an exchange
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this response, with id and question copied from the query
    Answer(Message),
    /// Fail with a transport error
    Transport(String),
    /// Fail with a decode error
    Decode(String),
}

/// A query the mock received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    /// Question name
    pub name: Name,
    /// Question type
    pub record_type: RecordType,
    /// Recursion desired bit
    pub recursion_desired: bool,
    /// AD bit on the query
    pub authentic_data: bool,
    /// Advertised EDNS payload size, if an OPT record was attached
    pub edns_payload: Option<u16>,
}

/// Exchanger that answers from a script
pub struct MockExchanger {
    replies: Mutex<HashMap<RecordType, MockReply>>,
    queries: Mutex<Vec<RecordedQuery>>,
    exchanges: AtomicUsize,
}

impl MockExchanger {
    /// Create a mock with no script; unscripted types fail with a transport error
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            exchanges: AtomicUsize::new(0),
        }
    }

    /// Script the reply for queries of `record_type`
    pub fn set_reply(&self, record_type: RecordType, reply: MockReply) {
        self.replies.lock().insert(record_type, reply);
    }

    /// Answer queries of `record_type` with `response`
    pub fn respond(&self, record_type: RecordType, response: Message) {
        self.set_reply(record_type, MockReply::Answer(response));
    }

    /// Fail queries of `record_type` with a transport error
    pub fn fail(&self, record_type: RecordType, reason: &str) {
        self.set_reply(record_type, MockReply::Transport(reason.to_string()));
    }

    /// Number of exchanges performed
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Queries received so far, in arrival order
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().clone()
    }
}

impl Default for MockExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchanger for MockExchanger {
    async fn exchange(&self, query: &Message, _target: &ServerTarget) -> Result<Exchanged> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let question = query
            .queries()
            .first()
            .ok_or_else(|| Error::Encode("query has no question".into()))?;

        self.queries.lock().push(RecordedQuery {
            name: question.name().clone(),
            record_type: question.query_type(),
            recursion_desired: query.recursion_desired(),
            authentic_data: query.authentic_data(),
            edns_payload: query.extensions().as_ref().map(|edns| edns.max_payload()),
        });

        let reply = self.replies.lock().get(&question.query_type()).cloned();

        match reply {
            Some(MockReply::Answer(mut message)) => {
                message.set_id(query.id());
                if message.queries().is_empty() {
                    message.add_query(question.clone());
                }
                Ok(Exchanged {
                    message,
                    rtt: std::time::Duration::ZERO,
                })
            }
            Some(MockReply::Transport(reason)) => Err(Error::Transport(reason)),
            Some(MockReply::Decode(reason)) => Err(Error::Decode(reason)),
            None => Err(Error::Transport(format!(
                "no scripted reply for {}",
                question.query_type()
            ))),
        }
    }
}

/// Build a response with the given AD flag and answer records
pub fn response(authenticated: bool, answers: Vec<Record>) -> Message {
    response_with_code(ResponseCode::NoError, authenticated, answers)
}

/// Build a response with the given rcode, AD flag and answer records
pub fn response_with_code(
    code: ResponseCode,
    authenticated: bool,
    answers: Vec<Record>,
) -> Message {
    let mut message = Message::new();
    message.set_message_type(MessageType::Response);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.set_recursion_available(true);
    message.set_authentic_data(authenticated);
    message.set_response_code(code);
    for answer in answers {
        message.add_answer(answer);
    }
    message
}

fn name(owner: &str) -> Name {
    Name::from_str(owner).unwrap_or_else(|_| Name::root())
}

/// Build an A record
pub fn a_record(owner: &str, ip: Ipv4Addr, ttl: u32) -> Record {
    Record::from_rdata(name(owner), ttl, RData::A(A(ip)))
}

/// Build an AAAA record
pub fn aaaa_record(owner: &str, ip: Ipv6Addr, ttl: u32) -> Record {
    Record::from_rdata(name(owner), ttl, RData::AAAA(AAAA(ip)))
}

/// Build a TLSA record from its numeric usage, selector and matching type
pub fn tlsa_record(
    owner: &str,
    usage: u8,
    selector: u8,
    matching: u8,
    data: Vec<u8>,
    ttl: u32,
) -> Record {
    let tlsa = TLSA::new(
        CertUsage::from(usage),
        Selector::from(selector),
        Matching::from(matching),
        data,
    );
    Record::from_rdata(name(owner), ttl, RData::TLSA(tlsa))
}
