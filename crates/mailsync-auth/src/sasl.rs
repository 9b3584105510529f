//! SASL mechanism encoders.
//!
//! Implements:
//! - PLAIN (RFC 4616) - username/password
//! - OAUTHBEARER (RFC 7628) - standard `OAuth2` bearer token
//! - XOAUTH2 (Google/Microsoft proprietary) - legacy bearer token
//!
//! Every encoder returns the base64 string that goes on the wire, either
//! inline after `AUTHENTICATE <mechanism>` (SASL-IR) or as the reply to the
//! first empty continuation request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::Result;

/// Generates the PLAIN response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded). The empty
/// authorization identity means "same as the authentication identity".
///
/// # Example
///
/// ```
/// use mailsync_auth::sasl::plain_response;
///
/// let response = plain_response("user@example.com", "password123");
/// assert!(!response.contains("password123"));
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
///
/// # Example
///
/// ```
/// use mailsync_auth::sasl::oauthbearer_response;
///
/// let response = oauthbearer_response("user@example.com", "ya29.a0");
/// assert!(!response.is_empty());
/// ```
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Reply that aborts an OAUTHBEARER exchange after an error challenge
/// (a single `\x01`, base64 encoded).
pub const OAUTHBEARER_ABORT: &str = "AQ==";

/// Decodes the text of a `+` continuation request.
///
/// An empty or whitespace-only text is an empty challenge.
///
/// # Errors
///
/// Returns an error if the text is not valid base64.
pub fn decode_challenge(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(STANDARD.decode(text)?)
}

/// Parses the JSON error challenge an OAuth-enabled server sends before
/// rejecting a bearer token.
///
/// `{"status":"401","schemes":"bearer","scope":"..."}`
///
/// # Errors
///
/// Returns an error if the challenge is not the expected JSON object.
pub fn parse_auth_error(challenge: &[u8]) -> Result<AuthErrorChallenge> {
    Ok(serde_json::from_slice(challenge)?)
}

/// `OAuth2` error challenge from the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthErrorChallenge {
    /// HTTP-style status code.
    pub status: String,
    /// Accepted authentication schemes.
    #[serde(default)]
    pub schemes: Option<String>,
    /// Scope the token is missing.
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn decoded(response: &str) -> String {
        String::from_utf8(STANDARD.decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_response_format() {
        assert_eq!(decoded(&plain_response("test", "pass")), "\0test\0pass");
    }

    #[test]
    fn test_oauthbearer_format() {
        assert_eq!(
            decoded(&oauthbearer_response("test@test.com", "abc")),
            "n,a=test@test.com,\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        assert_eq!(
            decoded(&xoauth2_response("test@test.com", "abc")),
            "user=test@test.com\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_abort_is_ctrl_a() {
        assert_eq!(STANDARD.decode(OAUTHBEARER_ABORT).unwrap(), b"\x01");
    }

    #[test]
    fn test_decode_empty_challenge() {
        assert!(decode_challenge("").unwrap().is_empty());
        assert!(decode_challenge("  ").unwrap().is_empty());
    }

    #[test]
    fn test_decode_challenge_rejects_garbage() {
        assert!(decode_challenge("not base64!").is_err());
    }

    #[test]
    fn test_parse_auth_error() {
        let json = br#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let error = parse_auth_error(json).unwrap();

        assert_eq!(error.status, "401");
        assert_eq!(error.schemes.as_deref(), Some("bearer"));
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
    }

    #[test]
    fn test_parse_auth_error_minimal() {
        let error = parse_auth_error(br#"{"status":"invalid_token"}"#).unwrap();
        assert_eq!(error.status, "invalid_token");
        assert!(error.scope.is_none());
    }

    proptest::proptest! {
        #[test]
        fn plain_round_trips(user in "[a-z@.]{1,20}", pass in "[ -~]{0,20}") {
            let text = decoded(&plain_response(&user, &pass));
            let expected = format!("\0{user}\0{pass}");
            proptest::prop_assert_eq!(text, expected);
        }
    }
}
