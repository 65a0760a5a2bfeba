//! Admin authentication: credential checking and bearer session tokens.
//!
//! Login compares the SHA-256 of the submitted password against the
//! configured digest using constant-time comparison, then issues a random
//! session token kept in memory. Tokens do not survive a restart; a
//! personal blog has one admin and logging in again is cheap.

use sha2::{Digest, Sha256};
use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

/// Validates a provided token against the expected token using constant-time comparison.
///
/// This prevents timing attacks by ensuring the comparison takes the same amount
/// of time regardless of where (or if) tokens differ.
///
/// Returns `false` if either token is empty.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    // Empty tokens are never valid
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    // Length mismatch - still compare to maintain constant time
    let len_match = provided.len() == expected.len();

    // XOR accumulator: if any byte differs, result will be non-zero
    let mut diff: u8 = 0;
    for (a, b) in provided.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    len_match && diff == 0
}

/// Extracts the bearer token from an Authorization header value.
///
/// Expected format: "Bearer <token>"
/// Returns `None` if the header doesn't match the expected format.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();

    // Case-insensitive "Bearer " prefix check (RFC 6750 allows case-insensitive)
    if header.len() < 7 {
        return None;
    }

    let (prefix, token) = header.split_at(7);
    if prefix.eq_ignore_ascii_case("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    } else {
        None
    }
}

/// Lowercase hex SHA-256 of a password, the form stored in config.
pub fn password_digest(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// In-memory set of live admin session tokens.
#[derive(Clone, Default)]
pub struct Sessions {
    tokens: Arc<RwLock<HashSet<String>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint and register a fresh random token.
    pub fn issue(&self) -> String {
        let bytes: [u8; 32] = rand::random();
        let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        self.tokens.write().unwrap().insert(token.clone());
        token
    }

    /// Check a presented token against every live session in constant time
    /// per entry.
    pub fn is_valid(&self, token: &str) -> bool {
        self.tokens
            .read()
            .unwrap()
            .iter()
            .fold(false, |acc, live| acc | validate_token(token, live))
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token_matching() {
        assert!(validate_token("secret123", "secret123"));
        assert!(validate_token("a", "a"));
        assert!(validate_token(
            "very-long-token-with-special-chars!@#$%",
            "very-long-token-with-special-chars!@#$%"
        ));
    }

    #[test]
    fn test_validate_token_mismatch() {
        assert!(!validate_token("secret123", "secret124"));
        assert!(!validate_token("secret123", "SECRET123"));
        assert!(!validate_token("short", "longer"));
        assert!(!validate_token("longer", "short"));
    }

    #[test]
    fn test_validate_token_empty() {
        assert!(!validate_token("", ""));
        assert!(!validate_token("", "secret"));
        assert!(!validate_token("secret", ""));
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        assert_eq!(extract_bearer_token("Bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("BEARER secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("  Bearer secret123  "), Some("secret123"));
    }

    #[test]
    fn test_extract_bearer_token_invalid() {
        assert_eq!(extract_bearer_token(""), None);
        assert_eq!(extract_bearer_token("Basic secret123"), None);
        assert_eq!(extract_bearer_token("Bearer"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Bearersecret123"), None);
        assert_eq!(extract_bearer_token("secret123"), None);
    }

    #[test]
    fn test_password_digest_is_hex_sha256() {
        // well-known digest of the empty string
        assert_eq!(
            password_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(password_digest("x").len(), 64);
    }

    #[test]
    fn test_sessions_issue_and_validate() {
        let sessions = Sessions::new();
        let token = sessions.issue();

        assert_eq!(token.len(), 64);
        assert!(sessions.is_valid(&token));
        assert!(!sessions.is_valid("forged"));
        assert!(!sessions.is_valid(""));

        sessions.revoke(&token);
        assert!(!sessions.is_valid(&token));
    }

    #[test]
    fn test_sessions_are_independent() {
        let sessions = Sessions::new();
        let a = sessions.issue();
        let b = sessions.issue();
        assert_ne!(a, b);

        sessions.revoke(&a);
        assert!(sessions.is_valid(&b));
    }
}
