//! The credential capability used by the session layer.
//!
//! A [`Credential`] is asked for its first [`AuthStep`] and then, for SASL
//! mechanisms, for a reply to every continuation challenge the server
//! sends. The session layer never sees the secret itself, only the encoded
//! wire form.

use std::fmt;

use crate::sasl::{self, OAUTHBEARER_ABORT};
use crate::{BearerToken, Error, Result};

/// Authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// The IMAP `LOGIN` command.
    Login,
    /// SASL PLAIN.
    Plain,
    /// SASL OAUTHBEARER (RFC 7628).
    OAuthBearer,
    /// SASL XOAUTH2.
    XOAuth2,
}

impl Mechanism {
    /// SASL name, or `LOGIN` for the plain command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
            Self::OAuthBearer => "OAUTHBEARER",
            Self::XOAuth2 => "XOAUTH2",
        }
    }

    /// Returns true for SASL mechanisms (sent with `AUTHENTICATE`).
    #[must_use]
    pub const fn is_sasl(self) -> bool {
        !matches!(self, Self::Login)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First step of an authentication exchange.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send `LOGIN <username> <password>`.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// Send `AUTHENTICATE <mechanism> [<initial response>]`.
    Sasl {
        /// Mechanism name.
        mechanism: Mechanism,
        /// Base64 initial response, present when SASL-IR may be used.
        initial_response: Option<String>,
    },
}

impl fmt::Debug for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Sasl { mechanism, .. } => f
                .debug_struct("Sasl")
                .field("mechanism", mechanism)
                .finish_non_exhaustive(),
        }
    }
}

/// Something that can authenticate a session.
///
/// Implementations are stateless with respect to the exchange: the server
/// challenge carries everything needed to produce the next reply.
pub trait Credential: Send + Sync + fmt::Debug {
    /// Mechanism this credential speaks.
    fn mechanism(&self) -> Mechanism;

    /// Produces the first step. `sasl_ir` is true when the server
    /// advertised `SASL-IR`, allowing the initial response inline.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be presented at all,
    /// e.g. an expired token.
    fn start(&self, sasl_ir: bool) -> Result<AuthStep>;

    /// Produces the base64 reply to a decoded continuation challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not part of this mechanism's
    /// exchange.
    fn respond(&self, challenge: &[u8]) -> Result<String>;
}

/// Username and password.
#[derive(Clone)]
pub struct PlainCredential {
    username: String,
    password: String,
    mechanism: Mechanism,
}

impl PlainCredential {
    /// Credential sent with the `LOGIN` command.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mechanism: Mechanism::Login,
        }
    }

    /// Uses `AUTHENTICATE PLAIN` instead of `LOGIN`.
    #[must_use]
    pub const fn with_sasl_plain(mut self) -> Self {
        self.mechanism = Mechanism::Plain;
        self
    }

    /// Returns the user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainCredential")
            .field("username", &self.username)
            .field("mechanism", &self.mechanism)
            .finish_non_exhaustive()
    }
}

impl Credential for PlainCredential {
    fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    fn start(&self, sasl_ir: bool) -> Result<AuthStep> {
        Ok(match self.mechanism {
            Mechanism::Login => AuthStep::Login {
                username: self.username.clone(),
                password: self.password.clone(),
            },
            mechanism => AuthStep::Sasl {
                mechanism,
                initial_response: sasl_ir
                    .then(|| sasl::plain_response(&self.username, &self.password)),
            },
        })
    }

    fn respond(&self, challenge: &[u8]) -> Result<String> {
        if challenge.is_empty() && self.mechanism == Mechanism::Plain {
            return Ok(sasl::plain_response(&self.username, &self.password));
        }
        Err(Error::UnexpectedChallenge {
            mechanism: self.mechanism.as_str(),
            challenge: String::from_utf8_lossy(challenge).into_owned(),
        })
    }
}

/// A user plus bearer token, for providers requiring delegated auth.
#[derive(Debug, Clone)]
pub struct BearerCredential {
    user: String,
    token: BearerToken,
    mechanism: Mechanism,
}

impl BearerCredential {
    /// Credential using OAUTHBEARER.
    #[must_use]
    pub fn oauthbearer(user: impl Into<String>, token: BearerToken) -> Self {
        Self {
            user: user.into(),
            token,
            mechanism: Mechanism::OAuthBearer,
        }
    }

    /// Credential using XOAUTH2.
    #[must_use]
    pub fn xoauth2(user: impl Into<String>, token: BearerToken) -> Self {
        Self {
            user: user.into(),
            token,
            mechanism: Mechanism::XOAuth2,
        }
    }

    /// Returns the token.
    #[must_use]
    pub const fn token(&self) -> &BearerToken {
        &self.token
    }

    fn initial_response(&self) -> String {
        match self.mechanism {
            Mechanism::XOAuth2 => sasl::xoauth2_response(&self.user, &self.token.access_token),
            _ => sasl::oauthbearer_response(&self.user, &self.token.access_token),
        }
    }
}

impl Credential for BearerCredential {
    fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    fn start(&self, sasl_ir: bool) -> Result<AuthStep> {
        if self.token.is_expired() {
            return Err(Error::TokenExpired);
        }
        Ok(AuthStep::Sasl {
            mechanism: self.mechanism,
            initial_response: sasl_ir.then(|| self.initial_response()),
        })
    }

    fn respond(&self, challenge: &[u8]) -> Result<String> {
        if challenge.is_empty() {
            return Ok(self.initial_response());
        }

        // A non-empty challenge is the JSON error; the server answers the
        // abort with a tagged NO.
        match sasl::parse_auth_error(challenge) {
            Ok(error) => tracing::warn!(
                mechanism = %self.mechanism,
                status = %error.status,
                scope = ?error.scope,
                "bearer token rejected"
            ),
            Err(error) => tracing::debug!(%error, "unreadable bearer error challenge"),
        }
        Ok(match self.mechanism {
            Mechanism::XOAuth2 => String::new(),
            _ => OAUTHBEARER_ABORT.to_string(),
        })
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

    mod plain_tests {
        use super::*;

        #[test]
        fn test_login_step() {
            let cred = PlainCredential::new("ann", "pw");
            let step = cred.start(true).unwrap();
            assert_eq!(
                step,
                AuthStep::Login {
                    username: "ann".into(),
                    password: "pw".into()
                }
            );
            assert!(!cred.mechanism().is_sasl());
        }

        #[test]
        fn test_sasl_plain_inline() {
            let cred = PlainCredential::new("ann", "pw").with_sasl_plain();
            let AuthStep::Sasl {
                mechanism,
                initial_response,
            } = cred.start(true).unwrap()
            else {
                panic!("expected SASL step");
            };
            assert_eq!(mechanism, Mechanism::Plain);
            assert_eq!(initial_response, Some(sasl::plain_response("ann", "pw")));
        }

        #[test]
        fn test_sasl_plain_without_ir_answers_empty_challenge() {
            let cred = PlainCredential::new("ann", "pw").with_sasl_plain();
            assert!(matches!(
                cred.start(false).unwrap(),
                AuthStep::Sasl {
                    initial_response: None,
                    ..
                }
            ));
            assert_eq!(cred.respond(b"").unwrap(), sasl::plain_response("ann", "pw"));
            assert!(cred.respond(b"what?").is_err());
        }

        #[test]
        fn test_debug_hides_password() {
            let cred = PlainCredential::new("ann", "hunter2");
            assert!(!format!("{cred:?}").contains("hunter2"));
            let step = cred.start(false).unwrap();
            assert!(!format!("{step:?}").contains("hunter2"));
        }
    }

    mod bearer_tests {
        use super::*;

        #[test]
        fn test_expired_token_is_refused() {
            let token = BearerToken::expiring_in("t", 0);
            let cred = BearerCredential::oauthbearer("ann@example.com", token);
            assert!(matches!(cred.start(true), Err(Error::TokenExpired)));
        }

        #[test]
        fn test_xoauth2_inline() {
            let cred = BearerCredential::xoauth2("ann@example.com", BearerToken::new("t"));
            let AuthStep::Sasl {
                mechanism,
                initial_response,
            } = cred.start(true).unwrap()
            else {
                panic!("expected SASL step");
            };
            assert_eq!(mechanism, Mechanism::XOAuth2);
            assert_eq!(
                initial_response,
                Some(sasl::xoauth2_response("ann@example.com", "t"))
            );
        }

        #[test]
        fn test_error_challenge_aborts() {
            let cred = BearerCredential::oauthbearer("ann@example.com", BearerToken::new("t"));
            let reply = cred.respond(br#"{"status":"401","schemes":"bearer"}"#).unwrap();
            assert_eq!(reply, OAUTHBEARER_ABORT);

            let cred = BearerCredential::xoauth2("ann@example.com", BearerToken::new("t"));
            assert_eq!(cred.respond(b"garbage").unwrap(), "");
        }
    }
}
