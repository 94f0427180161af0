//! Admin token checks
//!
//! Deleting a snippet requires the token it was created with, sent in the
//! `x-admin-token` header.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Result of checking a request against a stored token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Granted,
    /// No usable token header was sent
    Missing,
    /// Wrong token, or the snippet has none
    Denied,
}

/// Constant-time string comparison.
///
/// Only the length comparison leaks timing, and token lengths are not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}

/// Compare the request's admin token with the one stored on a snippet
pub fn check_admin_token(headers: &HeaderMap, stored: Option<&str>) -> TokenCheck {
    let Some(provided) = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    else {
        return TokenCheck::Missing;
    };

    match stored {
        Some(expected) if constant_time_compare(provided, expected) => TokenCheck::Granted,
        _ => TokenCheck::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret123", "secret123"));
        assert!(!constant_time_compare("secret123", "secret124"));
        assert!(!constant_time_compare("secret123", "secret12"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_matching_token_is_granted() {
        let check = check_admin_token(&headers_with("s3cret"), Some("s3cret"));
        assert_eq!(check, TokenCheck::Granted);
    }

    #[test]
    fn test_wrong_token_is_denied() {
        let check = check_admin_token(&headers_with("guess"), Some("s3cret"));
        assert_eq!(check, TokenCheck::Denied);
    }

    #[test]
    fn test_snippet_without_token_denies_everyone() {
        let check = check_admin_token(&headers_with("anything"), None);
        assert_eq!(check, TokenCheck::Denied);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            check_admin_token(&HeaderMap::new(), Some("s3cret")),
            TokenCheck::Missing
        );
        assert_eq!(
            check_admin_token(&headers_with(""), Some("s3cret")),
            TokenCheck::Missing
        );
    }
}
