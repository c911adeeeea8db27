//! Special-use domain filtering
//!
//! Names under the reserved top-level labels `test`, `example`, `invalid` and
//! `localhost` never go to the upstream resolver.

/// Top-level labels that are never resolved through the upstream
pub const SPECIAL_USE_TLDS: [&str; 4] = ["test", "example", "invalid", "localhost"];

/// Whether `hostname` should be resolved through the upstream resolver
///
/// ```
/// use dane_dns::should_resolve;
///
/// assert!(should_resolve("example.com"));
/// assert!(!should_resolve("foo.test"));
/// assert!(!should_resolve("localhost"));
/// ```
pub fn should_resolve(hostname: &str) -> bool {
    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);

    let tld = match hostname.rfind('.') {
        Some(index) => &hostname[index + 1..],
        None => hostname,
    };

    !SPECIAL_USE_TLDS
        .iter()
        .any(|reserved| tld.eq_ignore_ascii_case(reserved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_use_excluded() {
        assert!(!should_resolve("foo.test"));
        assert!(!should_resolve("bar.example"));
        assert!(!should_resolve("baz.invalid"));
        assert!(!should_resolve("qux.localhost"));
    }

    #[test]
    fn test_regular_names_resolved() {
        assert!(should_resolve("example.com"));
        assert!(should_resolve("test.example.org"));
        assert!(should_resolve("localhost.example.net"));
    }

    #[test]
    fn test_single_label() {
        assert!(!should_resolve("localhost"));
        assert!(!should_resolve("test"));
        assert!(should_resolve("intranet"));
    }

    #[test]
    fn test_fqdn_and_case() {
        assert!(!should_resolve("foo.test."));
        assert!(!should_resolve("Foo.TEST"));
        assert!(should_resolve("example.com."));
    }
}
