//! Error types for resolver operations

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use thiserror::Error;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving
#[derive(Debug, Error)]
pub enum Error {
    /// Server specification could not be parsed
    #[error("couldn't parse server address: {0}")]
    Parse(String),

    /// Server specification uses a scheme other than udp, tcp, tls or https
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    /// Network or transport failure talking to the upstream
    #[error("transport error: {0}")]
    Transport(String),

    /// Query could not be serialized to wire format
    #[error("failed to encode DNS query: {0}")]
    Encode(String),

    /// Response body is not a valid DNS message
    #[error("failed to decode DNS response: {0}")]
    Decode(String),

    /// Upstream set the TC bit
    #[error("response truncated")]
    Truncated,

    /// Upstream answered SERVFAIL
    #[error("server failure")]
    ServFail,

    /// Upstream answered with an rcode that is neither cacheable nor SERVFAIL
    #[error("failed with rcode {0}")]
    UnexpectedRcode(ResponseCode),

    /// The verify hook rejected the response
    #[error("verify error: {0}")]
    Verification(String),

    /// Both the A and the AAAA lookup failed
    #[error("ip lookup failed: [ipv4: {ipv4}, ipv6: {ipv6}]")]
    DualStack { ipv4: Box<Error>, ipv6: Box<Error> },

    /// TLSA lookup failed
    #[error("tlsa lookup failed: {0}")]
    Tlsa(#[source] Box<Error>),

    /// Resolution through the operating system failed
    #[error("ip lookup failed: {0}")]
    System(String),

    /// Query name or DANE service is not usable
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Record type has no cache in this resolver
    #[error("unsupported record type {0}")]
    UnsupportedRecordType(RecordType),

    /// Resolver configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the exchanger should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Whether the upstream reported a server failure
    pub fn is_servfail(&self) -> bool {
        matches!(self, Error::ServFail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(Error::Transport("timed out".into()).is_retryable());
        assert!(!Error::Decode("short read".into()).is_retryable());
        assert!(!Error::Truncated.is_retryable());
        assert!(!Error::ServFail.is_retryable());
    }

    #[test]
    fn test_dual_stack_mentions_both_families() {
        let err = Error::DualStack {
            ipv4: Box::new(Error::Transport("connection refused".into())),
            ipv6: Box::new(Error::ServFail),
        };
        let msg = err.to_string();
        assert!(msg.contains("ipv4: transport error: connection refused"));
        assert!(msg.contains("ipv6: server failure"));
    }

    #[test]
    fn test_rcode_display() {
        let err = Error::UnexpectedRcode(ResponseCode::Refused);
        assert!(err.to_string().starts_with("failed with rcode"));
        assert!(Error::ServFail.is_servfail());
    }
}
