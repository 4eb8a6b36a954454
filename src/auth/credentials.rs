//! Basic-auth credential resolution
//!
//! Decodes `"<scheme> <base64(user:pass)>"` header values. Malformed input
//! degrades to empty credentials rather than an error; an empty username
//! means unauthenticated and callers decide what that implies.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Resolved request credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether the credentials identify a user
    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }

    /// Parse an Authorization header value.
    ///
    /// The payload is split on the FIRST colon, so passwords may contain
    /// colons. Any malformed input yields empty credentials.
    pub fn from_header(header: &str) -> Self {
        let payload = match header.split_once(' ') {
            Some((_scheme, rest)) => rest.trim(),
            None => return Self::default(),
        };

        let decoded = match STANDARD.decode(payload) {
            Ok(bytes) => bytes,
            Err(_) => return Self::default(),
        };

        let text = match String::from_utf8(decoded) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };

        match text.split_once(':') {
            Some((username, password)) => Self::new(username, password),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    #[test]
    fn test_parse_valid_header() {
        let creds = Credentials::from_header(&encode("alice:s3cret"));
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cret");
        assert!(creds.is_authenticated());
    }

    #[test]
    fn test_password_may_contain_colons() {
        let creds = Credentials::from_header(&encode("bob:pa:ss:word"));
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password, "pa:ss:word");
    }

    #[test]
    fn test_missing_scheme_is_unauthenticated() {
        let creds = Credentials::from_header("notbase64atall");
        assert!(!creds.is_authenticated());
        assert!(creds.password.is_empty());
    }

    #[test]
    fn test_bad_base64_is_unauthenticated() {
        let creds = Credentials::from_header("Basic !!!not-base64!!!");
        assert_eq!(creds, Credentials::default());
    }

    #[test]
    fn test_payload_without_colon_is_unauthenticated() {
        let creds = Credentials::from_header(&encode("just-a-username"));
        assert_eq!(creds, Credentials::default());
    }

    #[test]
    fn test_non_utf8_payload_is_unauthenticated() {
        let header = format!("Basic {}", STANDARD.encode([0xff, 0xfe, 0x3a, 0xff]));
        let creds = Credentials::from_header(&header);
        assert_eq!(creds, Credentials::default());
    }
}
