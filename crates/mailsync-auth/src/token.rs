//! Bearer token value.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before the real expiry at which a token is treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// `OAuth2` access token with metadata.
///
/// Obtaining and refreshing tokens is the caller's job; the engine only
/// presents them and refuses to present one that is about to expire.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BearerToken {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiration time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token, kept for the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope granted by the authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl BearerToken {
    /// Creates a token of type "Bearer" with no expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// Creates a token expiring `secs` seconds from now.
    #[must_use]
    pub fn expiring_in(access_token: impl Into<String>, secs: u32) -> Self {
        Self::new(access_token).with_expires_at(Utc::now() + Duration::seconds(i64::from(secs)))
    }

    /// Checks if the token is expired, with a 60 second buffer.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= exp)
    }

    /// Returns true if the token is not expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
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

    #[test]
    fn test_token_without_expiry_is_valid() {
        let token = BearerToken::new("abc");
        assert!(token.is_valid());
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn test_token_expired() {
        let token = BearerToken::new("abc").with_expires_at(Utc::now() - Duration::seconds(1));
        assert!(token.is_expired());
    }

    #[test]
    fn test_token_within_skew_is_expired() {
        assert!(BearerToken::expiring_in("abc", 30).is_expired());
        assert!(BearerToken::expiring_in("abc", 3600).is_valid());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let token = BearerToken::new("secret-access").with_refresh_token("secret-refresh");
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_serde_round_trip_skips_empty_fields() {
        let token = BearerToken::new("abc").with_scope("mail");
        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("refresh_token"));
        let back: BearerToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}
