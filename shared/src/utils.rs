//! Utility functions for the task scheduling service

use regex::Regex;
use std::sync::OnceLock;

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Validate email address syntax
///
/// Accepts the usual local@domain.tld shape; this is a syntax check only, no
/// deliverability lookup is performed.
pub fn validate_email(candidate: &str) -> bool {
    let pattern = EMAIL_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$")
            .expect("email pattern compiles")
    });
    pattern.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_addresses() {
        assert!(validate_email("a@test.com"));
        assert!(validate_email("first.last+tag@sub.example.co.uk"));
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        assert!(!validate_email(""));
        assert!(!validate_email("missing-at.test.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email("user@nodot"));
        assert!(!validate_email("user@@test.com"));
        assert!(!validate_email("user @test.com"));
    }
}
