//! # mailsync-auth
//!
//! Credentials for the mailsync IMAP engine.
//!
//! ## Features
//!
//! - **Credential capability**: one [`Credential`] trait that produces the
//!   next authentication step, implemented for passwords and bearer tokens
//! - **SASL mechanisms**: PLAIN (RFC 4616), OAUTHBEARER (RFC 7628) and XOAUTH2
//! - **Token handling**: expiry check with a safety margin
//!
//! ## Quick Start
//!
//! ```
//! use mailsync_auth::{AuthStep, BearerCredential, BearerToken, Credential};
//!
//! let token = BearerToken::expiring_in("ya29.a0", 3600);
//! let credential = BearerCredential::oauthbearer("user@example.com", token);
//!
//! // With SASL-IR the whole exchange fits in the AUTHENTICATE line.
//! let step = credential.start(true).unwrap();
//! assert!(matches!(step, AuthStep::Sasl { initial_response: Some(_), .. }));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod credential;
pub mod error;
pub mod sasl;
mod token;

pub use credential::{AuthStep, BearerCredential, Credential, Mechanism, PlainCredential};
pub use error::{Error, Result};
pub use token::BearerToken;
