//! Cache lifetime of a DNS response

use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::rr::{Record, RecordType};

/// Lifetime used when a response carries no records
pub const MIN_TTL: Duration = Duration::from_secs(10);

/// Upper bound on any cache lifetime
pub const MAX_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Compute how long a response may be cached
///
/// This is the smallest TTL of the answer, authority and additional records,
/// clamped to [`MIN_TTL`]..=[`MAX_TTL`]. OPT pseudo-records are ignored
/// because their TTL field holds the extended rcode and flags. A response with
/// no records gets [`MIN_TTL`].
pub fn min_ttl(message: &Message) -> Duration {
    let counted = |r: &&Record| r.record_type() != RecordType::OPT;

    let mut records = message
        .answers()
        .iter()
        .chain(message.name_servers())
        .chain(message.additionals())
        .filter(counted)
        .peekable();

    if records.peek().is_none() {
        return MIN_TTL;
    }

    let min = records
        .map(|r| u64::from(r.ttl()))
        .fold(MAX_TTL.as_secs(), u64::min);

    Duration::from_secs(min).max(MIN_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, ResponseCode};
    use hickory_proto::rr::rdata::{A, OPT};
    use hickory_proto::rr::{Name, RData};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_record(ttl: u32) -> Record {
        Record::from_rdata(
            Name::from_str("example.com.").unwrap(),
            ttl,
            RData::A(A(Ipv4Addr::new(192, 0, 2, 1))),
        )
    }

    fn opt_record(ttl: u32) -> Record {
        Record::from_rdata(Name::root(), ttl, RData::OPT(OPT::default()))
    }

    fn response() -> Message {
        let mut message = Message::new();
        message.set_message_type(MessageType::Response);
        message.set_response_code(ResponseCode::NoError);
        message
    }

    #[test]
    fn test_empty_response_uses_floor() {
        assert_eq!(min_ttl(&response()), MIN_TTL);
    }

    #[test]
    fn test_only_opt_uses_floor() {
        let mut message = response();
        message.add_additional(opt_record(0));
        assert_eq!(min_ttl(&message), MIN_TTL);
    }

    #[test]
    fn test_minimum_across_sections() {
        let mut message = response();
        message.add_answer(a_record(300));
        message.add_answer(a_record(120));
        message.add_name_server(a_record(600));
        message.add_additional(a_record(90));
        assert_eq!(min_ttl(&message), Duration::from_secs(90));
    }

    #[test]
    fn test_opt_ttl_is_ignored() {
        let mut message = response();
        message.add_answer(a_record(300));
        message.add_additional(opt_record(1));
        assert_eq!(min_ttl(&message), Duration::from_secs(300));
    }

    #[test]
    fn test_capped_at_ceiling() {
        let mut message = response();
        message.add_answer(a_record(7 * 24 * 60 * 60));
        assert_eq!(min_ttl(&message), MAX_TTL);

        let mut message = response();
        message.add_answer(a_record(u32::MAX));
        assert_eq!(min_ttl(&message), MAX_TTL);
    }

    #[test]
    fn test_authority_only() {
        let mut message = response();
        message.set_response_code(ResponseCode::NXDomain);
        message.add_name_server(a_record(45));
        assert_eq!(min_ttl(&message), Duration::from_secs(45));
    }

    #[test]
    fn test_short_ttl_raised_to_floor() {
        let mut message = response();
        message.add_answer(a_record(0));
        message.add_answer(a_record(300));
        assert_eq!(min_ttl(&message), MIN_TTL);
    }

    #[test]
    fn test_bounds_hold() {
        for ttl in [0u32, 1, 10, 59, 3600, 10_800, 10_801, 86_400] {
            let mut message = response();
            message.add_answer(a_record(ttl));
            let computed = min_ttl(&message);
            assert!(computed >= MIN_TTL && computed <= MAX_TTL);
            assert_eq!(
                computed.as_secs(),
                u64::from(ttl).clamp(MIN_TTL.as_secs(), MAX_TTL.as_secs())
            );
        }
    }
}
